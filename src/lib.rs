//! Stakeledger - Proof-of-Stake Ledger Core
//!
//! Account ledger, speculative transaction pool and block production for a
//! time-sliced proof-of-stake chain.
//!
//! ## Modules
//!
//! - `structures`: AccountState, Transaction, Block, HTLC and Multisig records
//! - `ledger`: the `Ledger` contract and transaction dispatch
//! - `txpool`: mempool overlay with undo log
//! - `consensus`: PoS validator and the staker loop
//! - `chain`: committed chain head and block connection
//! - `db`: sled-backed committed ledger store
//! - `codec`: canonical binary encoding
//!
//! ## Locking
//!
//! The committed ledger section is always acquired before the pool section.
//! Both are `parking_lot` locks and are never held across an `.await`.

pub mod chain;
pub mod codec;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod db;
pub mod ledger;
pub mod status;
pub mod structures;
pub mod txpool;

// Re-exports for convenience
pub use crypto::{
    hash::blake2b_256,
    signatures::{Keypair, PublicKey, SecretKey, Signature},
};

pub use structures::{
    account::{AccountState, Input, Lease},
    block::Block,
    contract::{HashLock, Htlc, Multisig, TimeLock},
    transaction::{Transaction, TxData},
    types::{Amount, Hash256, Height, Timestamp},
};

pub use chain::{ChainState, LedgerDb, LedgerView};
pub use consensus::{pos, staker::Staker};
pub use ledger::Ledger;
pub use status::Status;
pub use txpool::TxPool;

/// Protocol constants
pub mod constants {
    use crate::structures::types::Amount;

    /// Length of a time slot in seconds
    pub const TIME_SLOT: i64 = 4;

    /// Time slots per target block interval
    pub const RAT: i64 = 4;

    /// Target block interval in seconds
    pub const TARGET_BLOCK_TIME: i64 = RAT * TIME_SLOT;

    pub const BLOCKS_IN_YEAR: i64 = 365 * 24 * 60 * 60 / TARGET_BLOCK_TIME;

    pub const DEFAULT_CONFIRMATIONS: u32 = 10;

    /// Blocks after which an input or lease counts as stake
    pub const MATURITY: u32 = 1350;

    pub const ROLLBACK_LIMIT: u32 = 1350;

    /// Window of block sizes used to compute the dynamic max block size
    pub const BLOCK_SIZE_SPAN: usize = 1351;

    /// Atomic units per coin
    pub const COIN: Amount = 100_000_000;

    /// Smallest lease accepted
    pub const MIN_LEASE: Amount = 1000 * COIN;

    pub const BLOCK_RESERVED_SIZE: u32 = 100;
    pub const DEFAULT_MAX_BLOCK_SIZE: u32 = 100_000;
    pub const MAX_BLOCK_SIZE: u32 = i32::MAX as u32 - BLOCK_RESERVED_SIZE;

    /// Difficulty retarget parameters
    pub const INTERVAL: i64 = 15;
    pub const SPACING: i64 = 10;
    pub const A1: i64 = (INTERVAL + 1) * TARGET_BLOCK_TIME;
    pub const A2: i64 = (INTERVAL - 1) * TARGET_BLOCK_TIME;

    /// Bytes reserved for the block header and the transaction count
    pub const BLOCK_HEADER_RESERVE: usize = 176;

    /// Length prefix reserved per transaction in a block body
    pub const TX_ITEM_OVERHEAD: usize = 4;

    /// Most deposits a multisig may hold
    pub const MAX_DEPOSITS: usize = 20;

    /// Big-endian bytes of the genesis difficulty
    pub const INITIAL_DIFFICULTY_BYTES: [u8; 25] = [
        0xAF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
        0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    ];

    /// Big-endian bytes of the largest difficulty (2^256 - 1)
    pub const MAX_DIFFICULTY_BYTES: [u8; 32] = [0xFF; 32];

    /// Protocol version written into block headers
    pub const BLOCK_VERSION: u32 = 2;
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Codec error: {0}")]
    Codec(#[from] codec::DecodeError),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Consensus error: {0}")]
    Consensus(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
