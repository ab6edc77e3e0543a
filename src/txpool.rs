//! Transaction pool
//!
//! Pending transactions are applied speculatively to an in-memory overlay of
//! the committed ledger. Each attempt records the first-seen pre-image of
//! every key it touches; a failed attempt is rolled back from that log, an
//! accepted one just drops it.
//!
//! - `process`: admit a transaction (rejects cache, size cap, fee floor)
//! - `fill`: copy pending transactions into a candidate block
//! - `check`: replay the pool against the committed ledger
//! - `block_connected`: drop transactions a new block included

use crate::chain::{LedgerDb, LedgerView};
use crate::codec::Decode;
use crate::config::PoolConfig;
use crate::constants::{BLOCK_HEADER_RESERVE, TX_ITEM_OVERHEAD};
use crate::crypto::signatures::PublicKey;
use crate::ledger::Ledger;
use crate::status::Status;
use crate::structures::account::AccountState;
use crate::structures::block::Block;
use crate::structures::contract::{ContractId, Htlc, Multisig};
use crate::structures::transaction::Transaction;
use crate::structures::types::{Amount, Hash256, Height, Timestamp};
use crate::Result;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

const NOTIFICATION_CAPACITY: usize = 1024;

/// Sent to subscribers for every accepted transaction
#[derive(Debug, Clone)]
pub struct TxNotification {
    pub tx: Transaction,
    pub hash: Hash256,
    pub time: Timestamp,
    pub size: usize,
}

/// Fee floor: `min_fee_rate` per started kilobyte
pub fn check_fee(min_fee_rate: Amount, size: usize, fee: Amount) -> bool {
    fee >= min_fee_rate.saturating_mul(1 + (size / 1000) as Amount)
}

// ============================================================================
// MemPool
// ============================================================================

#[derive(Debug, Default)]
struct MemPool {
    map: HashMap<Hash256, Vec<u8>>,
    /// Acceptance order
    order: Vec<Hash256>,
    data_size: usize,
}

impl MemPool {
    fn contains(&self, hash: &Hash256) -> bool {
        self.map.contains_key(hash)
    }

    fn add(&mut self, hash: Hash256, bytes: Vec<u8>) {
        self.data_size += bytes.len();
        self.map.insert(hash, bytes);
        self.order.push(hash);
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

// ============================================================================
// Overlay and undo log
// ============================================================================

#[derive(Debug, Default)]
struct Overlay {
    accounts: HashMap<PublicKey, AccountState>,
    /// `None` marks a contract removed by a pending transaction
    htlcs: HashMap<ContractId, Option<Htlc>>,
    multisigs: HashMap<ContractId, Option<Multisig>>,
    /// Overlay pre-images; `None` means absent from the overlay
    undo_accounts: HashMap<PublicKey, Option<AccountState>>,
    undo_htlcs: HashMap<ContractId, Option<Option<Htlc>>>,
    undo_multisigs: HashMap<ContractId, Option<Option<Multisig>>>,
}

/// Record the pre-image of `key` unless this attempt already has one
fn capture<K: Eq + Hash + Copy, V: Clone>(undo: &mut HashMap<K, Option<V>>, current: &HashMap<K, V>, key: &K) {
    if let Entry::Vacant(entry) = undo.entry(*key) {
        entry.insert(current.get(key).cloned());
    }
}

fn restore<K: Eq + Hash, V>(undo: &mut HashMap<K, Option<V>>, current: &mut HashMap<K, V>) {
    for (key, value) in undo.drain() {
        match value {
            Some(value) => current.insert(key, value),
            None => current.remove(&key),
        };
    }
}

impl Overlay {
    /// End an attempt: roll back unless it was accepted
    fn undo(&mut self, accepted: bool) {
        if accepted {
            self.undo_accounts.clear();
            self.undo_htlcs.clear();
            self.undo_multisigs.clear();
        } else {
            restore(&mut self.undo_accounts, &mut self.accounts);
            restore(&mut self.undo_htlcs, &mut self.htlcs);
            restore(&mut self.undo_multisigs, &mut self.multisigs);
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// `Ledger` over the overlay, falling back to the committed ledger
struct PoolLedger<'a, 'v> {
    overlay: &'a mut Overlay,
    view: &'a LedgerView<'v>,
}

impl Ledger for PoolLedger<'_, '_> {
    fn add_supply(&mut self, _amount: Amount) {}

    fn check_anchor(&self, hash: &Hash256) -> Result<bool> {
        self.view.check_anchor(hash)
    }

    fn block_hash(&self) -> Hash256 {
        self.view.state().block_hash
    }

    fn block_time(&self) -> Timestamp {
        self.view.state().block_time
    }

    fn height(&self) -> Height {
        self.view.state().height
    }

    fn get_account(&mut self, key: &PublicKey) -> Result<Option<AccountState>> {
        let overlay = &mut *self.overlay;
        capture(&mut overlay.undo_accounts, &overlay.accounts, key);
        match overlay.accounts.get(key) {
            Some(account) => Ok(Some(account.clone())),
            None => self.view.get_account(key),
        }
    }

    fn get_or_create(&mut self, key: &PublicKey) -> Result<AccountState> {
        Ok(self.get_account(key)?.unwrap_or_default())
    }

    fn set_account(&mut self, key: &PublicKey, state: AccountState) {
        let overlay = &mut *self.overlay;
        capture(&mut overlay.undo_accounts, &overlay.accounts, key);
        overlay.accounts.insert(*key, state);
    }

    fn add_htlc(&mut self, id: ContractId, htlc: Htlc) {
        let overlay = &mut *self.overlay;
        capture(&mut overlay.undo_htlcs, &overlay.htlcs, &id);
        overlay.htlcs.insert(id, Some(htlc));
    }

    fn get_htlc(&mut self, id: &ContractId) -> Result<Option<Htlc>> {
        let overlay = &mut *self.overlay;
        capture(&mut overlay.undo_htlcs, &overlay.htlcs, id);
        match overlay.htlcs.get(id) {
            Some(htlc) => Ok(htlc.clone()),
            None => self.view.get_htlc(id),
        }
    }

    fn remove_htlc(&mut self, id: &ContractId) {
        let overlay = &mut *self.overlay;
        capture(&mut overlay.undo_htlcs, &overlay.htlcs, id);
        overlay.htlcs.insert(*id, None);
    }

    fn add_multisig(&mut self, id: ContractId, multisig: Multisig) {
        let overlay = &mut *self.overlay;
        capture(&mut overlay.undo_multisigs, &overlay.multisigs, &id);
        overlay.multisigs.insert(id, Some(multisig));
    }

    fn get_multisig(&mut self, id: &ContractId) -> Result<Option<Multisig>> {
        let overlay = &mut *self.overlay;
        capture(&mut overlay.undo_multisigs, &overlay.multisigs, id);
        match overlay.multisigs.get(id) {
            Some(multisig) => Ok(multisig.clone()),
            None => self.view.get_multisig(id),
        }
    }

    fn remove_multisig(&mut self, id: &ContractId) {
        let overlay = &mut *self.overlay;
        capture(&mut overlay.undo_multisigs, &overlay.multisigs, id);
        overlay.multisigs.insert(*id, None);
    }
}

// ============================================================================
// Pool section
// ============================================================================

#[derive(Debug, Default)]
struct PoolState {
    mempool: MemPool,
    overlay: Overlay,
    rejects: HashSet<Hash256>,
    max_seen_size: usize,
}

struct Applied {
    status: Status,
    fee: Amount,
    /// Set when the transaction entered the pool
    accepted: Option<Transaction>,
}

impl PoolState {
    /// Decode, check the fee and apply one transaction to the overlay
    fn apply(&mut self, min_fee_rate: Amount, view: &LedgerView<'_>, hash: Hash256, bytes: &[u8]) -> Result<Applied> {
        let tx = match Transaction::from_bytes(bytes) {
            Ok(tx) => tx,
            Err(e) => {
                return Ok(Applied { status: Status::invalid(format!("Invalid transaction: {e}")), fee: 0, accepted: None })
            }
        };
        if !check_fee(min_fee_rate, bytes.len(), tx.fee) {
            let status = Status::invalid(format!("Too low fee {}", tx.fee));
            return Ok(Applied { status, fee: tx.fee, accepted: None });
        }

        let result = PoolLedger { overlay: &mut self.overlay, view }.process_transaction(&tx, &hash);
        let accepted = matches!(result, Ok(Status::Accepted));
        if accepted {
            self.mempool.add(hash, bytes.to_vec());
            self.max_seen_size = self.max_seen_size.max(self.mempool.len());
        }
        self.overlay.undo(accepted);

        let status = result?;
        let fee = tx.fee;
        Ok(Applied { status, fee, accepted: accepted.then_some(tx) })
    }

    /// Swap out the pending set and reset the overlay
    fn steal(&mut self) -> (Vec<Hash256>, HashMap<Hash256, Vec<u8>>) {
        let mempool = std::mem::replace(
            &mut self.mempool,
            MemPool { order: Vec::with_capacity(self.max_seen_size), ..MemPool::default() },
        );
        self.overlay.clear();
        (mempool.order, mempool.map)
    }

    fn check(&mut self, min_fee_rate: Amount, view: &LedgerView<'_>) -> Result<bool> {
        let (order, mut map) = self.steal();
        let mut result = true;
        for hash in &order {
            let Some(bytes) = map.remove(hash) else {
                error!("Inconsistent MemPool");
                result = false;
                continue;
            };
            if !self.apply(min_fee_rate, view, *hash, &bytes)?.status.is_accepted() {
                result = false;
            }
        }
        if !result {
            let kept = self.mempool.len();
            warn!("Removed {} transactions, {kept} remain in pool", order.len() - kept);
        }
        Ok(result)
    }

    fn remove(&mut self, min_fee_rate: Amount, view: &LedgerView<'_>, hashes: &[Hash256]) -> Result<()> {
        if hashes.is_empty() || self.mempool.len() == 0 {
            return Ok(());
        }
        let included: HashSet<&Hash256> = hashes.iter().collect();
        let (order, mut map) = self.steal();
        for hash in order.iter().filter(|h| !included.contains(h)) {
            match map.remove(hash) {
                Some(bytes) => {
                    self.apply(min_fee_rate, view, *hash, &bytes)?;
                }
                None => error!("Inconsistent MemPool"),
            }
        }
        Ok(())
    }

    fn fill(&self, budget: usize, block: &mut Block) {
        let mut free = budget.saturating_sub(BLOCK_HEADER_RESERVE);
        for hash in &self.mempool.order {
            if free == 0 {
                break;
            }
            let Some(bytes) = self.mempool.map.get(hash) else {
                error!("Inconsistent MemPool");
                continue;
            };
            if bytes.len() + TX_ITEM_OVERHEAD > free {
                break;
            }
            free -= bytes.len() + TX_ITEM_OVERHEAD;
            block.transactions.push(bytes.clone());
        }
    }
}

// ============================================================================
// TxPool
// ============================================================================

pub struct TxPool {
    config: PoolConfig,
    ledger: Arc<LedgerDb>,
    inner: Mutex<PoolState>,
    notifications: broadcast::Sender<TxNotification>,
}

impl TxPool {
    pub fn new(config: PoolConfig, ledger: Arc<LedgerDb>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self { config, ledger, inner: Mutex::new(PoolState::default()), notifications }
    }

    pub fn ledger(&self) -> &Arc<LedgerDb> {
        &self.ledger
    }

    /// Admit a transaction. Returns its status and fee (zero on early rejection).
    pub fn process(&self, hash: Hash256, bytes: &[u8], time: Timestamp, remote: bool) -> Result<(Status, Amount)> {
        let view = self.ledger.read();
        let mut inner = self.inner.lock();

        if inner.rejects.contains(&hash) {
            return Ok((Status::invalid("Already rejected tx"), 0));
        }
        if inner.mempool.contains(&hash) {
            return Ok((Status::AlreadyHave(hash.to_string()), 0));
        }
        if inner.mempool.data_size + bytes.len() > self.config.max_size_bytes {
            if remote {
                return Ok((Status::InFuture("TxPool is full".into()), 0));
            }
            warn!("TxPool is full");
        }

        let Applied { status, fee, accepted } = inner.apply(self.config.min_fee_rate, &view, hash, bytes)?;
        if let Some(tx) = accepted {
            // no subscribers is fine
            let _ = self.notifications.send(TxNotification { tx, hash, time, size: bytes.len() });
            debug!("Accepted {hash}");
        }
        if matches!(status, Status::Invalid(_) | Status::InFuture(_)) {
            inner.rejects.insert(hash);
        }
        Ok((status, fee))
    }

    /// Append pending transactions to `block` within the size budget
    pub fn fill(&self, block: &mut Block) {
        let view = self.ledger.read();
        let inner = self.inner.lock();
        let budget = (view.state().max_block_size as usize).min(self.config.soft_block_size_limit);
        inner.fill(budget, block);
    }

    /// Replay the pool against the committed ledger. Returns whether every
    /// pending transaction still applies.
    pub fn check(&self) -> Result<bool> {
        let view = self.ledger.read();
        self.inner.lock().check(self.config.min_fee_rate, &view)
    }

    /// Called by block connection with the ledger section still held
    pub fn block_connected(&self, view: &LedgerView<'_>, hashes: &[Hash256]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.rejects.clear();
        inner.remove(self.config.min_fee_rate, view, hashes)
    }

    /// Next sequence number for `key`, counting pending transactions
    pub fn get_sequence(&self, key: &PublicKey) -> Result<u32> {
        let view = self.ledger.read();
        let inner = self.inner.lock();
        if let Some(account) = inner.overlay.accounts.get(key) {
            return Ok(account.seq);
        }
        Ok(view.get_account(key)?.map_or(0, |account| account.seq))
    }

    /// Whether `hash` is neither pending nor rejected
    pub fn is_interesting(&self, hash: &Hash256) -> bool {
        let inner = self.inner.lock();
        !inner.rejects.contains(hash) && !inner.mempool.contains(hash)
    }

    pub fn get(&self, hash: &Hash256) -> Option<Vec<u8>> {
        self.inner.lock().mempool.map.get(hash).cloned()
    }

    /// Pending transaction hashes in acceptance order
    pub fn transactions(&self) -> Vec<Hash256> {
        self.inner.lock().mempool.order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().mempool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_size(&self) -> usize {
        self.inner.lock().mempool.data_size
    }

    pub fn max_seen_size(&self) -> usize {
        self.inner.lock().max_seen_size
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TxNotification> {
        self.notifications.subscribe()
    }

    /// Add bytes without validation, leaving the pool inconsistent
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&self, hash: Hash256, bytes: Vec<u8>) {
        self.inner.lock().mempool.add(hash, bytes);
    }
}
