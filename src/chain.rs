//! Committed chain head and block connection
//!
//! `LedgerDb` owns the committed ledger section: a `RwLock` around the chain
//! head with the store behind it. Readers take a `LedgerView`; block
//! connection takes the write lock, applies the block through an `Update`
//! overlay, commits, then downgrades and prunes the pool.
//!
//! Lock order is always ledger section first, pool section second.

use crate::codec::{Decode, Encoder};
use crate::config::Genesis;
use crate::constants::{BLOCK_SIZE_SPAN, BLOCK_VERSION, DEFAULT_MAX_BLOCK_SIZE};
use crate::consensus::pos;
use crate::crypto::hash::blake2b_256;
use crate::crypto::signatures::PublicKey;
use crate::db::{Commit, LedgerStore};
use crate::ensure_accepted;
use crate::ledger::Ledger;
use crate::status::Status;
use crate::structures::account::AccountState;
use crate::structures::block::Block;
use crate::structures::contract::{ContractId, Htlc, Multisig};
use crate::structures::transaction::Transaction;
use crate::structures::types::{Amount, Hash256, Height, Timestamp};
use crate::txpool::TxPool;
use crate::{Error, Result};
use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

/// Chain head record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub height: Height,
    pub block_hash: Hash256,
    pub block_time: Timestamp,
    pub difficulty: BigUint,
    pub cumulative_difficulty: BigUint,
    pub supply: Amount,
    pub nxtrng: Hash256,
    pub max_block_size: u32,
    /// Sizes of the most recent blocks, oldest first
    pub block_sizes: VecDeque<u32>,
    pub genesis_hash: Hash256,
}

impl ChainState {
    pub fn genesis(time: Timestamp, genesis_hash: Hash256, difficulty: BigUint, supply: Amount) -> Self {
        Self {
            height: 0,
            block_hash: genesis_hash,
            block_time: time,
            difficulty,
            cumulative_difficulty: BigUint::default(),
            supply,
            nxtrng: Hash256::ZERO,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            block_sizes: VecDeque::from([0]),
            genesis_hash,
        }
    }

    /// State after connecting a block of `size` bytes
    fn next(&self, hash: Hash256, block: &Block, size: u32, supply: Amount) -> Self {
        let difficulty = pos::next_difficulty(&self.difficulty, self.block_time, block.time);
        let cumulative_difficulty = pos::cumulative_difficulty(&self.cumulative_difficulty, &difficulty);
        let mut block_sizes = self.block_sizes.clone();
        if block_sizes.len() == BLOCK_SIZE_SPAN {
            block_sizes.pop_front();
        }
        block_sizes.push_back(size);
        Self {
            height: self.height + 1,
            block_hash: hash,
            block_time: block.time,
            difficulty,
            cumulative_difficulty,
            supply,
            nxtrng: pos::nxtrng(&self.nxtrng, &block.generator),
            max_block_size: pos::max_block_size(&block_sizes),
            block_sizes,
            genesis_hash: self.genesis_hash,
        }
    }
}

/// Hash identifying a genesis configuration
pub fn genesis_hash(genesis: &Genesis) -> Hash256 {
    let mut enc = Encoder::new();
    enc.i64(genesis.time).varint(genesis.balances.len() as u64);
    for balance in &genesis.balances {
        enc.item(&balance.public_key).i64(balance.amount);
    }
    enc.bytes(&genesis.difficulty().to_bytes_be());
    blake2b_256(&enc.finish())
}

fn check_anchor(state: &ChainState, store: &dyn LedgerStore, hash: &Hash256) -> Result<bool> {
    Ok(*hash == state.genesis_hash || store.block_height(hash)?.is_some())
}

// ============================================================================
// LedgerDb
// ============================================================================

pub struct LedgerDb {
    store: Box<dyn LedgerStore>,
    state: RwLock<ChainState>,
}

impl LedgerDb {
    /// Open the ledger, seeding it from `genesis` when the store is empty
    pub fn open(store: Box<dyn LedgerStore>, genesis: &Genesis) -> Result<Self> {
        if genesis.difficulty().is_zero() {
            return Err(Error::InvalidInput("genesis difficulty must be positive".into()));
        }
        let hash = genesis_hash(genesis);
        if let Some(state) = store.load_state()? {
            if state.genesis_hash != hash {
                return Err(Error::Consensus(format!(
                    "store belongs to genesis {} not {hash}",
                    state.genesis_hash
                )));
            }
            info!("Loaded ledger at height {} ({})", state.height, state.block_hash);
            return Ok(Self { store, state: RwLock::new(state) });
        }

        let mut accounts: HashMap<PublicKey, AccountState> = HashMap::new();
        let mut supply: Amount = 0;
        for balance in &genesis.balances {
            if balance.amount <= 0 {
                return Err(Error::InvalidInput(format!("genesis balance of {} is not positive", balance.public_key)));
            }
            supply = supply
                .checked_add(balance.amount)
                .ok_or_else(|| Error::InvalidInput("genesis supply overflow".into()))?;
            accounts.entry(balance.public_key).or_default().stake += balance.amount;
        }

        let state = ChainState::genesis(genesis.time, hash, genesis.difficulty(), supply);
        store.commit(&Commit {
            state: &state,
            block: None,
            accounts: &accounts,
            htlcs: &HashMap::new(),
            multisigs: &HashMap::new(),
        })?;
        info!("Created ledger from genesis {hash} with supply {supply}");
        Ok(Self { store, state: RwLock::new(state) })
    }

    /// Enter the shared ledger section
    pub fn read(&self) -> LedgerView<'_> {
        LedgerView { state: self.state.read(), store: self.store.as_ref() }
    }

    /// Snapshot of the chain head
    pub fn state(&self) -> ChainState {
        self.state.read().clone()
    }

    pub fn get_account(&self, key: &PublicKey) -> Result<Option<AccountState>> {
        Ok(self.store.get_account(key)?)
    }

    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Vec<u8>>> {
        Ok(self.store.get_block(hash)?)
    }

    /// Validate and connect a block on top of the current head.
    ///
    /// On success the pool's reject cache is cleared and the included
    /// transactions are removed from it.
    pub fn connect_block(&self, hash: &Hash256, bytes: &[u8], pool: &TxPool) -> Result<Status> {
        let block = match Block::from_bytes(bytes) {
            Ok(block) => block,
            Err(e) => return Ok(Status::invalid(format!("Invalid block: {e}"))),
        };
        if Block::hash_bytes(bytes) != *hash {
            return Ok(Status::invalid("Block hash mismatch"));
        }

        let state = self.state.write();
        if self.store.block_height(hash)?.is_some() {
            return Ok(Status::AlreadyHave(hash.to_string()));
        }
        if block.previous != state.block_hash {
            return Ok(Status::NotReachable(format!("previous {}", block.previous)));
        }
        if block.version != BLOCK_VERSION {
            return Ok(Status::invalid(format!("Unknown block version {}", block.version)));
        }
        if bytes.len() > state.max_block_size as usize {
            return Ok(Status::invalid(format!(
                "Too large block {} bytes, maximum {}",
                bytes.len(),
                state.max_block_size
            )));
        }
        if block.time <= state.block_time {
            return Ok(Status::invalid("Timestamp is too early"));
        }
        if !block.verify_content_hash(bytes) {
            return Ok(Status::invalid("Invalid content hash"));
        }
        if !block.verify_signature(hash) {
            return Ok(Status::invalid("Invalid signature"));
        }

        let mut update = Update::new(self.store.as_ref(), &state, &block);
        let Some(generator) = update.get_account(&block.generator)? else {
            return Ok(Status::invalid("Block generator not found"));
        };
        let height = update.height();
        ensure_accepted!(pos::check(
            block.time,
            &block.generator,
            &state.nxtrng,
            &state.difficulty,
            state.block_time,
            generator.staking_balance(height),
        ));
        update.set_account(&block.generator, generator);

        let mut fees: Amount = 0;
        let mut tx_hashes = Vec::with_capacity(block.transactions.len());
        for (index, tx_bytes) in block.transactions.iter().enumerate() {
            let prefix = format!("Transaction {index}");
            let tx = match Transaction::from_bytes(tx_bytes) {
                Ok(tx) => tx,
                Err(e) => return Ok(Status::invalid(format!("{prefix}: {e}"))),
            };
            let tx_hash = Transaction::hash_bytes(tx_bytes);
            ensure_accepted!(update.process_transaction(&tx, &tx_hash)?, &prefix);
            fees = match fees.checked_add(tx.fee) {
                Some(fees) => fees,
                None => return Ok(Status::invalid("Fee overflow")),
            };
            tx_hashes.push(tx_hash);
        }

        let mint = pos::mint(state.supply);
        let mut generator = update
            .get_account(&block.generator)?
            .ok_or_else(|| Error::Consensus(format!("generator {} vanished during block", block.generator)))?;
        generator.debit(height, mint + fees);
        update.set_account(&block.generator, generator);
        update.add_supply(mint);

        let next = state.next(*hash, &block, bytes.len() as u32, state.supply + update.supply);
        self.store.commit(&Commit {
            state: &next,
            block: Some((*hash, bytes)),
            accounts: &update.accounts,
            htlcs: &update.htlcs,
            multisigs: &update.multisigs,
        })?;
        drop(update);

        let mut state = state;
        *state = next;
        info!("Connected block {hash} at height {}", state.height);
        debug!("Block {hash} carried {} transactions, fees {fees}", tx_hashes.len());

        let view = LedgerView {
            state: RwLockWriteGuard::downgrade(state),
            store: self.store.as_ref(),
        };
        if let Err(e) = pool.block_connected(&view, &tx_hashes) {
            warn!("Pool update after block {hash} failed: {e}");
        }
        Ok(Status::Accepted)
    }
}

// ============================================================================
// LedgerView
// ============================================================================

/// Shared-section view of the committed ledger
pub struct LedgerView<'a> {
    state: RwLockReadGuard<'a, ChainState>,
    store: &'a dyn LedgerStore,
}

impl LedgerView<'_> {
    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn get_account(&self, key: &PublicKey) -> Result<Option<AccountState>> {
        Ok(self.store.get_account(key)?)
    }

    pub fn get_htlc(&self, id: &ContractId) -> Result<Option<Htlc>> {
        Ok(self.store.get_htlc(id)?)
    }

    pub fn get_multisig(&self, id: &ContractId) -> Result<Option<Multisig>> {
        Ok(self.store.get_multisig(id)?)
    }

    pub fn check_anchor(&self, hash: &Hash256) -> Result<bool> {
        check_anchor(&self.state, self.store, hash)
    }
}

// ============================================================================
// Block update overlay
// ============================================================================

/// Write set of one block. Discarded unless the whole block validates.
struct Update<'a> {
    store: &'a dyn LedgerStore,
    state: &'a ChainState,
    height: Height,
    block_time: Timestamp,
    supply: Amount,
    accounts: HashMap<PublicKey, AccountState>,
    htlcs: HashMap<ContractId, Option<Htlc>>,
    multisigs: HashMap<ContractId, Option<Multisig>>,
}

impl<'a> Update<'a> {
    fn new(store: &'a dyn LedgerStore, state: &'a ChainState, block: &Block) -> Self {
        Self {
            store,
            state,
            height: state.height + 1,
            block_time: block.time,
            supply: 0,
            accounts: HashMap::new(),
            htlcs: HashMap::new(),
            multisigs: HashMap::new(),
        }
    }
}

impl Ledger for Update<'_> {
    fn add_supply(&mut self, amount: Amount) {
        self.supply += amount;
    }

    fn check_anchor(&self, hash: &Hash256) -> Result<bool> {
        check_anchor(self.state, self.store, hash)
    }

    fn block_hash(&self) -> Hash256 {
        self.state.block_hash
    }

    fn block_time(&self) -> Timestamp {
        self.block_time
    }

    fn height(&self) -> Height {
        self.height
    }

    fn get_account(&mut self, key: &PublicKey) -> Result<Option<AccountState>> {
        if let Some(account) = self.accounts.get(key) {
            return Ok(Some(account.clone()));
        }
        Ok(self.store.get_account(key)?.map(|mut account| {
            account.prune(self.height);
            account
        }))
    }

    fn get_or_create(&mut self, key: &PublicKey) -> Result<AccountState> {
        Ok(self.get_account(key)?.unwrap_or_default())
    }

    fn set_account(&mut self, key: &PublicKey, state: AccountState) {
        self.accounts.insert(*key, state);
    }

    fn add_htlc(&mut self, id: ContractId, htlc: Htlc) {
        self.htlcs.insert(id, Some(htlc));
    }

    fn get_htlc(&mut self, id: &ContractId) -> Result<Option<Htlc>> {
        match self.htlcs.get(id) {
            Some(htlc) => Ok(htlc.clone()),
            None => Ok(self.store.get_htlc(id)?),
        }
    }

    fn remove_htlc(&mut self, id: &ContractId) {
        self.htlcs.insert(*id, None);
    }

    fn add_multisig(&mut self, id: ContractId, multisig: Multisig) {
        self.multisigs.insert(id, Some(multisig));
    }

    fn get_multisig(&mut self, id: &ContractId) -> Result<Option<Multisig>> {
        match self.multisigs.get(id) {
            Some(multisig) => Ok(multisig.clone()),
            None => Ok(self.store.get_multisig(id)?),
        }
    }

    fn remove_multisig(&mut self, id: &ContractId) {
        self.multisigs.insert(*id, None);
    }
}
