//! Per-account ledger record
//!
//! An account holds:
//! - `stake`: mature balance, spendable and counted for staking
//! - `immature`: inputs waiting for MATURITY confirmations, oldest first
//! - `leases`: coins leased to or from another key, counted for staking once mature
//!
//! `balance = stake + Σ immature`, `total_balance = balance + Σ leases`.

use crate::codec::{Decode, DecodeResult, Decoder, Encode, Encoder};
use crate::constants::{MATURITY, MIN_LEASE};
use crate::crypto::signatures::PublicKey;
use crate::status::Status;
use crate::structures::types::{Amount, Height};

/// Coins received at `height`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    pub height: Height,
    pub amount: Amount,
}

impl Input {
    pub fn new(height: Height, amount: Amount) -> Self {
        Self { height, amount }
    }

    pub fn is_confirmed(&self, height: Height, confirmations: u32) -> bool {
        height.saturating_sub(confirmations) > self.height
    }

    pub fn is_mature(&self, height: Height) -> bool {
        self.is_confirmed(height, MATURITY)
    }
}

/// A lease between this account and `public_key`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub public_key: PublicKey,
    pub height: Height,
    pub amount: Amount,
}

impl Lease {
    pub fn new(public_key: PublicKey, height: Height, amount: Amount) -> Self {
        Self { public_key, height, amount }
    }

    pub fn is_mature(&self, height: Height) -> bool {
        height.saturating_sub(MATURITY) > self.height
    }

    fn matches(&self, public_key: &PublicKey, height: Height, amount: Amount) -> bool {
        self.public_key == *public_key && self.height == height && self.amount == amount
    }

    /// Take `withdraw` out of the lease, leaving at least MIN_LEASE
    pub fn withdraw(&mut self, withdraw: Amount) -> Status {
        let limit = self.amount - MIN_LEASE;
        if withdraw > limit {
            return Status::invalid(format!("Can not withdraw more than {limit}"));
        }
        self.amount -= withdraw;
        Status::Accepted
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    pub seq: u32,
    pub stake: Amount,
    pub immature: Vec<Input>,
    pub leases: Vec<Lease>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account whose whole balance is already mature
    pub fn with_stake(stake: Amount) -> Self {
        Self { stake, ..Self::default() }
    }

    pub fn balance(&self) -> Amount {
        self.stake + self.immature.iter().map(|i| i.amount).sum::<Amount>()
    }

    pub fn confirmed_balance(&self, height: Height, confirmations: u32) -> Amount {
        self.stake
            + self
                .immature
                .iter()
                .filter(|i| i.is_confirmed(height, confirmations))
                .map(|i| i.amount)
                .sum::<Amount>()
    }

    /// Weight of this account in the PoS check at `height`
    pub fn staking_balance(&self, height: Height) -> Amount {
        self.stake
            + self
                .immature
                .iter()
                .filter(|i| i.is_mature(height))
                .map(|i| i.amount)
                .sum::<Amount>()
            + self
                .leases
                .iter()
                .filter(|l| l.is_mature(height))
                .map(|l| l.amount)
                .sum::<Amount>()
    }

    pub fn total_balance(&self) -> Amount {
        self.balance() + self.leases.iter().map(|l| l.amount).sum::<Amount>()
    }

    /// Spend `amount`: stake first, then immature inputs oldest-first.
    pub fn credit(&mut self, amount: Amount) -> Status {
        if amount < 0 {
            return Status::invalid("Negative amount");
        }
        if amount <= self.stake {
            self.stake -= amount;
            return Status::Accepted;
        }
        if self.balance() < amount {
            return Status::invalid("Insufficient funds");
        }

        let mut residual = amount - self.stake;
        self.stake = 0;
        let mut consumed = 0;
        for input in self.immature.iter_mut() {
            if input.amount > residual {
                input.amount -= residual;
                break;
            }
            residual -= input.amount;
            consumed += 1;
            if residual == 0 {
                break;
            }
        }
        self.immature.drain(..consumed);
        Status::Accepted
    }

    /// Receive `amount` as an immature input at `height`.
    pub fn debit(&mut self, height: Height, amount: Amount) {
        if amount != 0 {
            self.immature.push(Input::new(height, amount));
        }
    }

    /// Move matured inputs into stake. Returns whether anything moved.
    pub fn prune(&mut self, height: Height) -> bool {
        let matured: Amount = self
            .immature
            .iter()
            .filter(|i| i.is_mature(height))
            .map(|i| i.amount)
            .sum();
        if matured == 0 {
            return false;
        }
        self.stake += matured;
        self.immature.retain(|i| !i.is_mature(height));
        true
    }

    pub fn add_lease(&mut self, public_key: PublicKey, height: Height, amount: Amount) {
        self.leases.push(Lease::new(public_key, height, amount));
    }

    pub fn remove_lease(&mut self, public_key: &PublicKey, height: Height, amount: Amount) -> Status {
        match self.leases.iter().position(|l| l.matches(public_key, height, amount)) {
            Some(index) => {
                self.leases.remove(index);
                Status::Accepted
            }
            None => Status::invalid("Lease not found"),
        }
    }

    pub fn withdraw_from_lease(
        &mut self,
        withdraw: Amount,
        amount: Amount,
        public_key: &PublicKey,
        height: Height,
    ) -> Status {
        match self.leases.iter_mut().find(|l| l.matches(public_key, height, amount)) {
            Some(lease) => lease.withdraw(withdraw),
            None => Status::invalid("Lease not found"),
        }
    }
}

// ============================================================================
// Canonical encoding
// ============================================================================

impl Encode for Input {
    fn encode(&self, enc: &mut Encoder) {
        enc.varint(self.height as u64).item(&self.amount);
    }
}

impl Decode for Input {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let height = decode_height(dec)?;
        let amount = dec.item()?;
        Ok(Self { height, amount })
    }
}

impl Encode for Lease {
    fn encode(&self, enc: &mut Encoder) {
        enc.item(&self.public_key)
            .varint(self.height as u64)
            .item(&self.amount);
    }
}

impl Decode for Lease {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let public_key = dec.item()?;
        let height = decode_height(dec)?;
        let amount = dec.item()?;
        Ok(Self { public_key, height, amount })
    }
}

impl Encode for AccountState {
    fn encode(&self, enc: &mut Encoder) {
        enc.varint(self.seq as u64)
            .item(&self.stake)
            .list(&self.immature)
            .list(&self.leases);
    }
}

impl Decode for AccountState {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let seq = u32::try_from(dec.varint()?)
            .map_err(|_| crate::codec::DecodeError::InvalidValue("seq"))?;
        Ok(Self {
            seq,
            stake: dec.item()?,
            immature: dec.list()?,
            leases: dec.list()?,
        })
    }
}

fn decode_height(dec: &mut Decoder<'_>) -> DecodeResult<Height> {
    Height::try_from(dec.varint()?).map_err(|_| crate::codec::DecodeError::InvalidValue("height"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;
    use proptest::prelude::*;

    fn key(b: u8) -> PublicKey {
        PublicKey([b; 32])
    }

    #[test]
    fn test_credit_from_stake() {
        let mut account = AccountState::with_stake(1000);
        assert_eq!(account.credit(400), Status::Accepted);
        assert_eq!(account.stake, 600);
        assert_eq!(account.credit(700), Status::invalid("Insufficient funds"));
        assert_eq!(account.stake, 600);
    }

    #[test]
    fn test_credit_negative() {
        let mut account = AccountState::with_stake(1000);
        assert_eq!(account.credit(-1), Status::invalid("Negative amount"));
    }

    #[test]
    fn test_credit_drains_immature_fifo() {
        let mut account = AccountState::with_stake(100);
        account.debit(5, 50);
        account.debit(6, 70);
        account.debit(7, 30);

        assert_eq!(account.credit(180), Status::Accepted);
        assert_eq!(account.stake, 0);
        // 100 from stake, 50 from the first input, 30 of 70 from the second
        assert_eq!(account.immature, vec![Input::new(6, 40), Input::new(7, 30)]);
        assert_eq!(account.balance(), 70);
    }

    #[test]
    fn test_credit_consumes_exact_input() {
        let mut account = AccountState::new();
        account.debit(1, 50);
        account.debit(2, 50);

        assert_eq!(account.credit(50), Status::Accepted);
        assert_eq!(account.immature, vec![Input::new(2, 50)]);
    }

    #[test]
    fn test_debit_zero_is_noop() {
        let mut account = AccountState::new();
        account.debit(10, 0);
        assert!(account.immature.is_empty());
    }

    #[test]
    fn test_maturity_boundary() {
        let input = Input::new(10, 1);
        assert!(!input.is_mature(10 + MATURITY));
        assert!(input.is_mature(10 + MATURITY + 1));
    }

    #[test]
    fn test_prune() {
        let mut account = AccountState::new();
        account.debit(1, 10);
        account.debit(100, 20);

        assert!(!account.prune(MATURITY));
        assert!(account.prune(MATURITY + 2));
        assert_eq!(account.stake, 10);
        assert_eq!(account.immature, vec![Input::new(100, 20)]);
        assert!(!account.prune(MATURITY + 2));
    }

    #[test]
    fn test_staking_balance_counts_mature_only() {
        let mut account = AccountState::with_stake(5);
        account.debit(10, 7);
        account.add_lease(key(1), 10, 1000 * COIN);

        assert_eq!(account.staking_balance(10 + MATURITY), 5);
        assert_eq!(account.staking_balance(11 + MATURITY), 5 + 7 + 1000 * COIN);
        assert_eq!(account.confirmed_balance(15, 5), 5);
        assert_eq!(account.confirmed_balance(16, 5), 12);
        assert_eq!(account.total_balance(), 12 + 1000 * COIN);
    }

    #[test]
    fn test_leases() {
        let mut account = AccountState::new();
        account.add_lease(key(1), 3, 1500 * COIN);

        assert_eq!(account.remove_lease(&key(2), 3, 1500 * COIN), Status::invalid("Lease not found"));
        assert_eq!(
            account.withdraw_from_lease(600 * COIN, 1500 * COIN, &key(1), 3),
            Status::invalid(format!("Can not withdraw more than {}", 500 * COIN))
        );
        assert_eq!(account.withdraw_from_lease(500 * COIN, 1500 * COIN, &key(1), 3), Status::Accepted);
        assert_eq!(account.leases[0].amount, 1000 * COIN);
        assert_eq!(account.remove_lease(&key(1), 3, 1000 * COIN), Status::Accepted);
        assert!(account.leases.is_empty());
    }

    #[test]
    fn test_encoding() {
        let mut account = AccountState::with_stake(COIN);
        account.seq = 3;
        account.debit(7, 11);
        account.add_lease(key(9), 8, MIN_LEASE);

        let bytes = account.to_bytes();
        assert_eq!(AccountState::from_bytes(&bytes).unwrap(), account);
        assert!(AccountState::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    fn arb_account() -> impl Strategy<Value = AccountState> {
        (
            0..1_000_000i64,
            prop::collection::vec((0..5000u32, 1..1_000_000i64), 0..8),
        )
            .prop_map(|(stake, inputs)| AccountState {
                seq: 0,
                stake,
                immature: inputs.into_iter().map(|(h, a)| Input::new(h, a)).collect(),
                leases: Vec::new(),
            })
    }

    proptest! {
        #[test]
        fn prop_credit_then_debit_keeps_total(mut account in arb_account(), x in 0..2_000_000i64, h in 0..5000u32) {
            let before = account.total_balance();
            if account.credit(x) == Status::Accepted {
                account.debit(h, x);
                prop_assert_eq!(account.total_balance(), before);
            } else {
                prop_assert_eq!(account.total_balance(), before);
            }
            prop_assert_eq!(
                account.balance(),
                account.stake + account.immature.iter().map(|i| i.amount).sum::<i64>()
            );
        }

        #[test]
        fn prop_prune_idempotent(mut account in arb_account(), h in 0..8000u32) {
            let balance = account.balance();
            account.prune(h);
            prop_assert!(!account.prune(h));
            prop_assert_eq!(account.balance(), balance);
        }
    }
}
