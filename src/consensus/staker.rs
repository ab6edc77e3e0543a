//! Staker: block production loop
//!
//! One background task per node wakes at every time slot boundary and runs
//! the PoS check for each registered stakeholder. A winner builds a block
//! from the pool, signs it and hands it to the network.
//!
//! The task exists exactly while at least one stakeholder is registered.
//! Stopping the last one cancels the task, which interrupts the slot wait.

use crate::chain::{ChainState, LedgerDb, LedgerView};
use crate::constants::{TARGET_BLOCK_TIME, TIME_SLOT};
use crate::consensus::pos;
use crate::crypto::signatures::{Keypair, PublicKey};
use crate::structures::block::Block;
use crate::structures::types::{Amount, Hash256, Timestamp};
use crate::txpool::TxPool;
use crate::{Error, Result};
use num_traits::ToPrimitive;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Peer-to-peer side of the node as seen by the staker
pub trait Network: Send + Sync {
    fn is_offline(&self) -> bool;

    fn is_initial_sync(&self) -> bool;

    /// Announce a block. `false` means it was not accepted.
    fn broadcast_block(&self, hash: Hash256, bytes: Vec<u8>) -> bool;
}

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;

    fn now(&self) -> Timestamp {
        self.now_millis().div_euclid(1000)
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Registered stakeholder
pub struct StakerState {
    keypair: Keypair,
    start_time: i64,
    hash_counter: u64,
    last_block: Hash256,
    stake: Amount,
}

impl StakerState {
    fn new(keypair: Keypair, start_time: i64) -> Self {
        Self { keypair, start_time, hash_counter: 0, last_block: Hash256::ZERO, stake: 0 }
    }

    fn public_key(&self) -> &PublicKey {
        self.keypair.public_key()
    }

    /// PoS checks per second since registration
    fn hash_rate(&self, now_millis: i64) -> f64 {
        let elapsed = now_millis - self.start_time;
        if elapsed > 0 {
            self.hash_counter as f64 / (elapsed as f64 / 1000.0)
        } else {
            0.0
        }
    }

    fn update(&mut self, view: &LedgerView<'_>) -> Result<()> {
        let state = view.state();
        self.last_block = state.block_hash;
        self.stake = view
            .get_account(self.public_key())?
            .map_or(0, |account| account.staking_balance(state.height));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakingInfo {
    pub accounts: usize,
    pub hash_rate: f64,
    pub weight: String,
    pub network_weight: String,
    pub expected_time: i64,
}

struct Task {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

#[derive(Default)]
struct Registry {
    stakers: Vec<StakerState>,
    task: Option<Task>,
}

struct Inner {
    ledger: Arc<LedgerDb>,
    pool: Arc<TxPool>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    registry: Mutex<Registry>,
    state: Mutex<&'static str>,
}

pub struct Staker {
    inner: Arc<Inner>,
}

impl Staker {
    pub fn new(ledger: Arc<LedgerDb>, pool: Arc<TxPool>, network: Arc<dyn Network>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                pool,
                network,
                clock,
                registry: Mutex::new(Registry::default()),
                state: Mutex::new("Initializing staker"),
            }),
        }
    }

    /// Register a stakeholder. Starts the loop for the first one.
    ///
    /// Returns `false` if the key is already staking. Must be called within a
    /// tokio runtime.
    pub fn start_staking(&self, keypair: Keypair) -> Result<bool> {
        let mut registry = self.inner.registry.lock();
        if registry.stakers.iter().any(|s| s.public_key() == keypair.public_key()) {
            info!("Stakeholder is already active");
            return Ok(false);
        }

        let mut staker = StakerState::new(keypair, self.inner.clock.now_millis());
        staker.update(&self.inner.ledger.read())?;
        if staker.stake == 0 {
            warn!("Stakeholder has zero active balance");
        }

        if registry.stakers.is_empty() {
            let handle = Handle::try_current()
                .map_err(|e| Error::Consensus(format!("staker needs a tokio runtime: {e}")))?;
            let token = CancellationToken::new();
            let inner = Arc::clone(&self.inner);
            let task = handle.spawn(inner.run(token.clone()));
            registry.task = Some(Task { handle: task, token });
            registry.stakers.push(staker);
            self.inner.set_state("Started staker");
        } else {
            registry.stakers.push(staker);
        }
        Ok(true)
    }

    /// Unregister a stakeholder. Stops the loop after the last one.
    pub fn stop_staking(&self, public_key: &PublicKey) -> bool {
        let mut registry = self.inner.registry.lock();
        let Some(index) = registry.stakers.iter().position(|s| s.public_key() == public_key) else {
            info!("Stakeholder is not active");
            return false;
        };
        registry.stakers.remove(index);
        if registry.stakers.is_empty() {
            if let Some(task) = registry.task.take() {
                task.token.cancel();
            }
            self.inner.set_state("Stopped staker");
        }
        true
    }

    pub fn is_staking(&self, public_key: &PublicKey) -> bool {
        self.inner.registry.lock().stakers.iter().any(|s| s.public_key() == public_key)
    }

    /// Whether the background loop is alive
    pub fn is_running(&self) -> bool {
        self.inner
            .registry
            .lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Last reported loop state
    pub fn state(&self) -> &'static str {
        *self.inner.state.lock()
    }

    /// Run one slot at `now`
    pub fn run_slot(&self, now: Timestamp) -> Result<()> {
        self.inner.run_slot(now)
    }

    /// Staking summary for one stakeholder or all of them
    pub fn info(&self, public_key: Option<&PublicKey>) -> StakingInfo {
        let now = self.inner.clock.now_millis();
        let registry = self.inner.registry.lock();
        let selected = registry
            .stakers
            .iter()
            .filter(|s| public_key.map_or(true, |key| s.public_key() == key));

        let mut accounts = 0;
        let mut hash_rate = 0.0;
        let mut weight: Amount = 0;
        for staker in selected {
            accounts += 1;
            hash_rate += staker.hash_rate(now);
            weight = weight.saturating_add(staker.stake);
        }

        let difficulty = self.inner.ledger.state().difficulty;
        let network_weight = (pos::max_difficulty() / difficulty).to_i64().unwrap_or(i64::MAX)
            / TARGET_BLOCK_TIME
            * TIME_SLOT;
        let expected_time = if weight != 0 {
            (TARGET_BLOCK_TIME as i128 * network_weight as i128 / weight as i128) as i64
        } else {
            0
        };
        StakingInfo {
            accounts,
            hash_rate,
            weight: weight.to_string(),
            network_weight: network_weight.to_string(),
            expected_time,
        }
    }
}

impl Drop for Staker {
    fn drop(&mut self) {
        if let Some(task) = self.inner.registry.lock().task.take() {
            task.token.cancel();
        }
    }
}

impl Inner {
    fn set_state(&self, value: &'static str) {
        let mut state = self.state.lock();
        if *state != value {
            *state = value;
            info!("{value}");
        }
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            let now = self.clock.now_millis();
            let seconds = now.div_euclid(1000);
            let next_slot = seconds - seconds.rem_euclid(TIME_SLOT) + TIME_SLOT;
            let delay = (next_slot * 1000 - now).max(0) as u64;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }
            if let Err(e) = self.run_slot(self.clock.now()) {
                error!("Staker slot failed: {e}");
            }
        }
    }

    fn run_slot(&self, now: Timestamp) -> Result<()> {
        if self.network.is_offline() {
            self.set_state("Awaiting to get online");
            return Ok(());
        }
        if self.network.is_initial_sync() {
            self.set_state("Awaiting to get synchronized");
            return Ok(());
        }
        self.set_state("Staking");

        let mut state = self.ledger.state();
        let time_slot = now - now.rem_euclid(TIME_SLOT);
        if time_slot <= state.block_time {
            return Ok(());
        }

        let keys: Vec<PublicKey> = self.registry.lock().stakers.iter().map(|s| *s.public_key()).collect();
        for key in keys {
            // registry is released before proposing, the network may call back into the staker
            let winner = {
                let mut registry = self.registry.lock();
                let Some(staker) = registry.stakers.iter_mut().find(|s| *s.public_key() == key) else {
                    continue;
                };
                if staker.last_block != state.block_hash {
                    let view = self.ledger.read();
                    state = view.state().clone();
                    staker.update(&view)?;
                }
                staker.hash_counter += 1;
                let proof = pos::check(
                    time_slot,
                    staker.public_key(),
                    &state.nxtrng,
                    &state.difficulty,
                    state.block_time,
                    staker.stake,
                );
                proof.is_accepted().then(|| staker.keypair.clone())
            };
            if let Some(keypair) = winner {
                if self.propose(&keypair, &state, time_slot)? {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Build and announce a block for a won slot. Returns `true` when the
    /// slot is settled and no other stakeholder should try.
    fn propose(&self, keypair: &Keypair, state: &ChainState, time_slot: Timestamp) -> Result<bool> {
        let mut block = Block::create(state.block_hash, time_slot, *keypair.public_key());
        self.pool.fill(&mut block);
        let (hash, bytes) = block.sign(keypair);
        info!("Staked {hash}");
        if self.network.broadcast_block(hash, bytes) {
            return Ok(true);
        }

        // lost the slot or a transaction went stale
        if time_slot <= self.ledger.state().block_time {
            return Ok(true);
        }
        if block.transactions.is_empty() {
            return Ok(true);
        }
        block.transactions.clear();
        if !self.pool.check()? {
            self.pool.fill(&mut block);
            if !block.transactions.is_empty() {
                let (hash, bytes) = block.sign(keypair);
                warn!("Retry {hash}");
                if self.network.broadcast_block(hash, bytes) {
                    return Ok(true);
                }
                block.transactions.clear();
            }
        }
        let (hash, bytes) = block.sign(keypair);
        warn!("Empty {hash}");
        self.network.broadcast_block(hash, bytes);
        Ok(false)
    }
}
