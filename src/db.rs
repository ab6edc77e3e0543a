//! Sled-backed committed ledger store
//!
//! Accounts, HTLCs and multisigs are stored in their canonical encoding,
//! keyed by public key or contract id. The chain head record is node-local
//! and kept in bincode.

use crate::chain::ChainState;
use crate::codec::{Decode, DecodeError, Encode};
use crate::crypto::signatures::PublicKey;
use crate::structures::account::AccountState;
use crate::structures::contract::{ContractId, Htlc, Multisig};
use crate::structures::types::{Hash256, Height};
use sled::transaction::{TransactionError, TransactionResult};
use sled::{Batch, Db, Transactional, Tree};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

const STATE_KEY: &[u8] = b"state";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] bincode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
}

/// Changes produced by connecting one block (or seeding genesis)
pub struct Commit<'a> {
    pub state: &'a ChainState,
    /// Hash and bytes of the connected block; `None` for genesis
    pub block: Option<(Hash256, &'a [u8])>,
    pub accounts: &'a HashMap<PublicKey, AccountState>,
    /// `None` deletes the contract
    pub htlcs: &'a HashMap<ContractId, Option<Htlc>>,
    pub multisigs: &'a HashMap<ContractId, Option<Multisig>>,
}

/// Read/write contract of the committed ledger
pub trait LedgerStore: Send + Sync {
    fn get_account(&self, key: &PublicKey) -> Result<Option<AccountState>, DbError>;

    fn get_htlc(&self, id: &ContractId) -> Result<Option<Htlc>, DbError>;

    fn get_multisig(&self, id: &ContractId) -> Result<Option<Multisig>, DbError>;

    /// Height of a connected block
    fn block_height(&self, hash: &Hash256) -> Result<Option<Height>, DbError>;

    fn get_block(&self, hash: &Hash256) -> Result<Option<Vec<u8>>, DbError>;

    fn load_state(&self) -> Result<Option<ChainState>, DbError>;

    fn commit(&self, commit: &Commit<'_>) -> Result<(), DbError>;
}

pub struct SledStore {
    db: Db,
    accounts: Tree,
    htlcs: Tree,
    multisigs: Tree,
    chain: Tree,
    blocks: Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Self::from_db(sled::open(path)?)
    }

    /// Store deleted on drop
    pub fn temporary() -> Result<Self, DbError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, DbError> {
        let accounts = db.open_tree("accounts")?;
        let htlcs = db.open_tree("htlcs")?;
        let multisigs = db.open_tree("multisigs")?;
        let chain = db.open_tree("chain")?;
        let blocks = db.open_tree("blocks")?;
        Ok(Self { db, accounts, htlcs, multisigs, chain, blocks })
    }

    fn get_decoded<T: Decode>(tree: &Tree, key: &[u8]) -> Result<Option<T>, DbError> {
        match tree.get(key)? {
            Some(value) => Ok(Some(T::from_bytes(&value)?)),
            None => Ok(None),
        }
    }

    fn contract_batch<T: Encode>(changes: &HashMap<ContractId, Option<T>>) -> Batch {
        let mut batch = Batch::default();
        for (id, value) in changes {
            match value {
                Some(value) => batch.insert(&id.as_bytes()[..], value.to_bytes()),
                None => batch.remove(&id.as_bytes()[..]),
            }
        }
        batch
    }
}

impl LedgerStore for SledStore {
    fn get_account(&self, key: &PublicKey) -> Result<Option<AccountState>, DbError> {
        Self::get_decoded(&self.accounts, key.as_bytes())
    }

    fn get_htlc(&self, id: &ContractId) -> Result<Option<Htlc>, DbError> {
        Self::get_decoded(&self.htlcs, id.as_bytes())
    }

    fn get_multisig(&self, id: &ContractId) -> Result<Option<Multisig>, DbError> {
        Self::get_decoded(&self.multisigs, id.as_bytes())
    }

    fn block_height(&self, hash: &Hash256) -> Result<Option<Height>, DbError> {
        match self.chain.get(hash.as_bytes())? {
            Some(value) => {
                let bytes: [u8; 4] = value.as_ref().try_into().map_err(|_| DbError::Corrupt("block height"))?;
                Ok(Some(Height::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    fn get_block(&self, hash: &Hash256) -> Result<Option<Vec<u8>>, DbError> {
        Ok(self.blocks.get(hash.as_bytes())?.map(|v| v.to_vec()))
    }

    fn load_state(&self) -> Result<Option<ChainState>, DbError> {
        match self.db.get(STATE_KEY)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn commit(&self, commit: &Commit<'_>) -> Result<(), DbError> {
        let mut accounts = Batch::default();
        for (key, account) in commit.accounts {
            accounts.insert(&key.as_bytes()[..], account.to_bytes());
        }
        let htlcs = Self::contract_batch(commit.htlcs);
        let multisigs = Self::contract_batch(commit.multisigs);
        let head = bincode::serialize(commit.state)?;
        let height = commit.state.height.to_be_bytes();

        // one transaction across every tree, so a failed commit leaves nothing behind
        let result: TransactionResult<(), DbError> =
            (&self.accounts, &self.htlcs, &self.multisigs, &self.chain, &self.blocks, &*self.db).transaction(
                |(accounts_tx, htlcs_tx, multisigs_tx, chain_tx, blocks_tx, head_tx)| {
                    accounts_tx.apply_batch(&accounts)?;
                    htlcs_tx.apply_batch(&htlcs)?;
                    multisigs_tx.apply_batch(&multisigs)?;
                    if let Some((hash, bytes)) = commit.block {
                        chain_tx.insert(&hash.as_bytes()[..], &height[..])?;
                        blocks_tx.insert(&hash.as_bytes()[..], bytes)?;
                    }
                    head_tx.insert(STATE_KEY, head.as_slice())?;
                    Ok(())
                },
            );
        result.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => DbError::Sled(e),
        })?;
        self.db.flush()?;
        Ok(())
    }
}
