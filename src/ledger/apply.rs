//! Transaction processors
//!
//! `process_envelope` handles what every transaction shares (sender lookup,
//! sequence, fee, prune, sequence bump); `apply` does the payload-specific
//! part. Processors may write partial state before failing; callers discard
//! or undo the whole attempt.

use super::Ledger;
use crate::constants::{MAX_DEPOSITS, MIN_LEASE};
use crate::crypto::signatures;
use crate::ensure_accepted;
use crate::status::Status;
use crate::structures::contract::{contract_id, Htlc, Multisig};
use crate::structures::transaction::{
    Batch, Burn, CancelLease, ClaimHtlc, CreateHtlc, CreateMultisig, LeaseTx, RefundHtlc,
    SpendMultisig, Transaction, Transfer, TxData, WithdrawFromLease,
};
use crate::structures::types::{Amount, Hash256};
use crate::{Error, Result};

pub(super) fn process_envelope<L: Ledger + ?Sized>(
    ledger: &mut L,
    tx: &Transaction,
    hash: &Hash256,
    payload: &TxData,
) -> Result<Status> {
    let Some(mut account) = ledger.get_account(&tx.from)? else {
        return Ok(Status::invalid("Sender account not found"));
    };
    if tx.seq < account.seq {
        return Ok(Status::AlreadyHave(format!("sequence {} expected {}", tx.seq, account.seq)));
    }
    if tx.seq > account.seq {
        return Ok(Status::InFuture(format!("sequence {} expected {}", tx.seq, account.seq)));
    }
    if account.seq == u32::MAX {
        return Ok(Status::invalid("Sequence overflow"));
    }
    ensure_accepted!(account.credit(tx.fee), "Transaction fee");
    ledger.set_account(&tx.from, account);

    ensure_accepted!(apply(ledger, payload, tx, hash, 0)?);

    let mut account = ledger
        .get_account(&tx.from)?
        .ok_or_else(|| Error::Consensus(format!("sender {} vanished during processing", tx.from)))?;
    account.prune(ledger.height());
    account.seq += 1;
    ledger.set_account(&tx.from, account);
    Ok(Status::Accepted)
}

fn apply<L: Ledger + ?Sized>(
    ledger: &mut L,
    payload: &TxData,
    tx: &Transaction,
    hash: &Hash256,
    data_index: u32,
) -> Result<Status> {
    match payload {
        TxData::Transfer(d) => transfer(ledger, d, tx),
        TxData::Burn(d) => burn(ledger, d, tx),
        TxData::Lease(d) => lease(ledger, d, tx),
        TxData::CancelLease(d) => cancel_lease(ledger, d, tx),
        TxData::WithdrawFromLease(d) => withdraw_from_lease(ledger, d, tx),
        TxData::Bundle(_) => Ok(Status::Accepted),
        TxData::CreateHtlc(d) => create_htlc(ledger, d, tx, hash, data_index),
        TxData::ClaimHtlc(d) => claim_htlc(ledger, d, tx),
        TxData::RefundHtlc(d) => refund_htlc(ledger, d, tx),
        TxData::CreateMultisig(d) => create_multisig(ledger, d, tx, hash, data_index),
        TxData::SpendMultisig(d) => spend_multisig(ledger, d, tx),
        TxData::Batch(d) => batch(ledger, d, tx, hash),
    }
}

/// Spend `amount` from the sender
fn credit_sender<L: Ledger + ?Sized>(ledger: &mut L, tx: &Transaction, amount: Amount) -> Result<Status> {
    let Some(mut account) = ledger.get_account(&tx.from)? else {
        return Ok(Status::invalid("Sender account not found"));
    };
    ensure_accepted!(account.credit(amount));
    ledger.set_account(&tx.from, account);
    Ok(Status::Accepted)
}

fn debit<L: Ledger + ?Sized>(ledger: &mut L, key: &signatures::PublicKey, amount: Amount) -> Result<()> {
    let height = ledger.height();
    let mut account = ledger.get_or_create(key)?;
    account.debit(height, amount);
    ledger.set_account(key, account);
    Ok(())
}

fn transfer<L: Ledger + ?Sized>(ledger: &mut L, d: &Transfer, tx: &Transaction) -> Result<Status> {
    ensure_accepted!(credit_sender(ledger, tx, d.amount)?);
    debit(ledger, &d.to, d.amount)?;
    Ok(Status::Accepted)
}

fn burn<L: Ledger + ?Sized>(ledger: &mut L, d: &Burn, tx: &Transaction) -> Result<Status> {
    ensure_accepted!(credit_sender(ledger, tx, d.amount)?);
    ledger.add_supply(-d.amount);
    Ok(Status::Accepted)
}

fn lease<L: Ledger + ?Sized>(ledger: &mut L, d: &LeaseTx, tx: &Transaction) -> Result<Status> {
    if d.amount < MIN_LEASE {
        return Ok(Status::invalid(format!("Lease amount {} is less than minimum {MIN_LEASE}", d.amount)));
    }
    ensure_accepted!(credit_sender(ledger, tx, d.amount)?);
    let height = ledger.height();
    let mut delegate = ledger.get_or_create(&d.to)?;
    delegate.add_lease(tx.from, height, d.amount);
    ledger.set_account(&d.to, delegate);
    Ok(Status::Accepted)
}

fn cancel_lease<L: Ledger + ?Sized>(ledger: &mut L, d: &CancelLease, tx: &Transaction) -> Result<Status> {
    let Some(mut delegate) = ledger.get_account(&d.to)? else {
        return Ok(Status::invalid("Account not found"));
    };
    ensure_accepted!(delegate.remove_lease(&tx.from, d.height, d.amount));
    ledger.set_account(&d.to, delegate);
    debit(ledger, &tx.from, d.amount)?;
    Ok(Status::Accepted)
}

fn withdraw_from_lease<L: Ledger + ?Sized>(
    ledger: &mut L,
    d: &WithdrawFromLease,
    tx: &Transaction,
) -> Result<Status> {
    if d.withdraw <= 0 {
        return Ok(Status::invalid("Invalid withdraw amount"));
    }
    let Some(mut delegate) = ledger.get_account(&d.to)? else {
        return Ok(Status::invalid("Account not found"));
    };
    ensure_accepted!(delegate.withdraw_from_lease(d.withdraw, d.amount, &tx.from, d.height));
    ledger.set_account(&d.to, delegate);
    debit(ledger, &tx.from, d.withdraw)?;
    Ok(Status::Accepted)
}

fn create_htlc<L: Ledger + ?Sized>(
    ledger: &mut L,
    d: &CreateHtlc,
    tx: &Transaction,
    hash: &Hash256,
    data_index: u32,
) -> Result<Status> {
    if let Err(e) = d.time_lock.validate() {
        return Ok(Status::Invalid(e));
    }
    if let Err(e) = d.hash_lock.validate() {
        return Ok(Status::Invalid(e));
    }
    ensure_accepted!(credit_sender(ledger, tx, d.amount)?);

    let htlc = Htlc {
        height: ledger.height(),
        time: ledger.block_time(),
        amount: d.amount,
        from: tx.from,
        to: d.to,
        time_lock: d.time_lock,
        hash_lock: d.hash_lock.clone(),
    };
    ledger.add_htlc(contract_id(hash, data_index), htlc);
    Ok(Status::Accepted)
}

fn claim_htlc<L: Ledger + ?Sized>(ledger: &mut L, d: &ClaimHtlc, tx: &Transaction) -> Result<Status> {
    let Some(htlc) = ledger.get_htlc(&d.id)? else {
        return Ok(Status::invalid("HTLC not found"));
    };
    if tx.from != htlc.to {
        return Ok(Status::invalid("Invalid sender"));
    }
    if !htlc.hash_lock.verify(&d.preimage) {
        return Ok(Status::invalid("Invalid preimage"));
    }
    debit(ledger, &tx.from, htlc.amount)?;
    ledger.remove_htlc(&d.id);
    Ok(Status::Accepted)
}

fn refund_htlc<L: Ledger + ?Sized>(ledger: &mut L, d: &RefundHtlc, tx: &Transaction) -> Result<Status> {
    let Some(htlc) = ledger.get_htlc(&d.id)? else {
        return Ok(Status::invalid("HTLC not found"));
    };
    if tx.from != htlc.from {
        return Ok(Status::invalid("Invalid sender"));
    }
    if !htlc
        .time_lock
        .verify(htlc.height, htlc.time, ledger.height(), ledger.block_time())
    {
        return Ok(Status::InFuture("HTLC time lock has not expired".into()));
    }
    debit(ledger, &tx.from, htlc.amount)?;
    ledger.remove_htlc(&d.id);
    Ok(Status::Accepted)
}

fn create_multisig<L: Ledger + ?Sized>(
    ledger: &mut L,
    d: &CreateMultisig,
    tx: &Transaction,
    hash: &Hash256,
    data_index: u32,
) -> Result<Status> {
    if d.n == 0 || d.n as usize > d.deposits.len() {
        return Ok(Status::invalid("Invalid n"));
    }
    if d.deposits.len() > MAX_DEPOSITS {
        return Ok(Status::invalid("Too many deposits"));
    }
    if d.signatures.len() > d.deposits.len() {
        return Ok(Status::invalid("Too many signatures"));
    }
    let total = d
        .deposits
        .iter()
        .try_fold(0 as Amount, |sum, deposit| sum.checked_add(deposit.amount));
    if !matches!(total, Some(total) if total > 0) {
        return Ok(Status::invalid("Invalid total amount"));
    }

    let deposit_hash = d.deposit_hash(&tx.from, tx.seq, data_index);
    for (i, deposit) in d.deposits.iter().enumerate() {
        if deposit.amount == 0 {
            continue;
        }
        let Some(signature) = d.signatures.iter().find(|s| s.index as usize == i) else {
            return Ok(Status::invalid(format!("Unsigned deposit {i}")));
        };
        if !signatures::verify(&deposit.from, &deposit_hash, &signature.signature) {
            return Ok(Status::invalid(format!("Invalid signature for deposit {i}")));
        }
        let Some(mut account) = ledger.get_account(&deposit.from)? else {
            return Ok(Status::invalid("Account not found"));
        };
        ensure_accepted!(account.credit(deposit.amount), &format!("CreateMultisig at index {i}"));
        ledger.set_account(&deposit.from, account);
    }

    let multisig = Multisig { n: d.n, deposits: d.deposits.clone() };
    ledger.add_multisig(contract_id(hash, data_index), multisig);
    Ok(Status::Accepted)
}

fn spend_multisig<L: Ledger + ?Sized>(ledger: &mut L, d: &SpendMultisig, tx: &Transaction) -> Result<Status> {
    let Some(multisig) = ledger.get_multisig(&d.id)? else {
        return Ok(Status::invalid("Multisig not found"));
    };
    if d.amounts.len() != multisig.deposits.len() {
        return Ok(Status::invalid("Invalid number of amounts"));
    }
    if d.amounts.iter().any(|a| *a < 0) {
        return Ok(Status::invalid("Negative amount"));
    }
    let total = d
        .amounts
        .iter()
        .try_fold(0 as Amount, |sum, amount| sum.checked_add(*amount));
    if total != Some(multisig.amount()) {
        return Ok(Status::invalid("Invalid total amount"));
    }
    if d.signatures.len() + 1 < multisig.n as usize {
        return Ok(Status::invalid("Invalid number of signatures"));
    }

    let spend_hash = d.spend_hash();
    let mut signed = vec![false; multisig.deposits.len()];
    for signature in &d.signatures {
        let index = signature.index as usize;
        let Some(deposit) = multisig.deposits.get(index) else {
            return Ok(Status::invalid(format!("Invalid signature index {index}")));
        };
        if signed[index] {
            return Ok(Status::invalid(format!("Duplicate signature {index}")));
        }
        if !signatures::verify(&deposit.from, &spend_hash, &signature.signature) {
            return Ok(Status::invalid(format!("Invalid signature {index}")));
        }
        signed[index] = true;
    }
    let sender_unsigned = multisig
        .deposits
        .iter()
        .zip(&signed)
        .any(|(deposit, signed)| !*signed && deposit.from == tx.from);
    if !sender_unsigned {
        return Ok(Status::invalid("Invalid sender"));
    }

    for (deposit, amount) in multisig.deposits.iter().zip(&d.amounts) {
        if *amount != 0 {
            debit(ledger, &deposit.from, *amount)?;
        }
    }
    ledger.remove_multisig(&d.id);
    Ok(Status::Accepted)
}

fn batch<L: Ledger + ?Sized>(ledger: &mut L, d: &Batch, tx: &Transaction, hash: &Hash256) -> Result<Status> {
    if d.items.is_empty() {
        return Ok(Status::invalid("Empty batch"));
    }
    for (i, item) in d.items.iter().enumerate() {
        let payload = match TxData::decode_payload(item.tx_type, &item.data) {
            Ok(payload) => payload,
            Err(e) => return Ok(Status::invalid(format!("Batch item {i}: {e}"))),
        };
        if matches!(payload, TxData::Batch(_)) {
            return Ok(Status::invalid("Nested batch"));
        }
        ensure_accepted!(apply(ledger, &payload, tx, hash, i as u32)?, &format!("Batch item {i}"));
    }
    Ok(Status::Accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{COIN, MATURITY};
    use crate::crypto::signatures::{Keypair, PublicKey};
    use crate::ledger::testing::MemoryLedger;
    use crate::structures::account::AccountState;
    use crate::structures::contract::{Deposit, HashAlgorithm, HashLock, TimeLock, TimeLockKind};
    use crate::structures::transaction::{BatchItem, Bundle};
    use rand::rngs::OsRng;

    const FEE: Amount = 1000;

    struct Fixture {
        ledger: MemoryLedger,
        alice: Keypair,
        bob: Keypair,
    }

    impl Fixture {
        fn new() -> Self {
            let mut ledger = MemoryLedger::new(MATURITY * 2);
            let alice = Keypair::generate(&mut OsRng);
            let bob = Keypair::generate(&mut OsRng);
            ledger.set_account(alice.public_key(), AccountState::with_stake(10_000 * COIN));
            ledger.set_account(bob.public_key(), AccountState::with_stake(5_000 * COIN));
            Self { ledger, alice, bob }
        }

        fn send(&mut self, signer: &Keypair, payload: TxData) -> Status {
            let (tx, hash) = self.signed(signer, &payload);
            self.process(&tx, &hash)
        }

        /// Process, discarding every change if the transaction is not accepted
        fn process(&mut self, tx: &Transaction, hash: &Hash256) -> Status {
            let snapshot = self.ledger.clone();
            let status = self.ledger.process_transaction(tx, hash).unwrap();
            if !status.is_accepted() {
                self.ledger = snapshot;
            }
            status
        }

        fn signed(&self, signer: &Keypair, payload: &TxData) -> (Transaction, Hash256) {
            let seq = self.seq(signer.public_key());
            let mut tx = Transaction::create(*signer.public_key(), seq, MemoryLedger::genesis(), FEE, payload);
            let (hash, _) = tx.sign(signer);
            (tx, hash)
        }

        fn seq(&self, key: &PublicKey) -> u32 {
            self.ledger.accounts.get(key).map(|a| a.seq).unwrap_or(0)
        }

        fn account(&self, key: &PublicKey) -> AccountState {
            self.ledger.accounts.get(key).cloned().unwrap_or_default()
        }
    }

    fn transfer(to: &Keypair, amount: Amount) -> TxData {
        TxData::Transfer(Transfer { amount, to: *to.public_key(), message: Vec::new() })
    }

    #[test]
    fn test_transfer() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());

        assert_eq!(f.send(&alice, transfer(&bob, 100 * COIN)), Status::Accepted);

        let a = f.account(alice.public_key());
        assert_eq!(a.seq, 1);
        assert_eq!(a.balance(), 10_000 * COIN - 100 * COIN - FEE);
        let b = f.account(bob.public_key());
        assert_eq!(b.immature.len(), 1);
        assert_eq!(b.balance(), 5_100 * COIN);
    }

    #[test]
    fn test_bad_signature() {
        let f = Fixture::new();
        let (mut tx, hash) = f.signed(&f.alice, &transfer(&f.bob, 1));
        tx.signature.0[0] ^= 1;
        let mut ledger = f.ledger.clone();
        assert_eq!(ledger.process_transaction(&tx, &hash).unwrap(), Status::invalid("Invalid signature"));
    }

    #[test]
    fn test_unknown_anchor() {
        let f = Fixture::new();
        let mut tx = Transaction::create(*f.alice.public_key(), 0, Hash256([9; 32]), FEE, &transfer(&f.bob, 1));
        let (hash, _) = tx.sign(&f.alice);
        let mut ledger = f.ledger.clone();
        assert!(matches!(ledger.process_transaction(&tx, &hash).unwrap(), Status::NotReachable(_)));
    }

    #[test]
    fn test_negative_fee() {
        let f = Fixture::new();
        let mut tx = Transaction::create(*f.alice.public_key(), 0, MemoryLedger::genesis(), -1, &transfer(&f.bob, 1));
        let (hash, _) = tx.sign(&f.alice);
        let mut ledger = f.ledger.clone();
        assert_eq!(ledger.process_transaction(&tx, &hash).unwrap(), Status::invalid("Negative fee"));
    }

    #[test]
    fn test_sequence_checks() {
        let mut f = Fixture::new();
        let payload = transfer(&f.bob, 1);
        let mut tx = Transaction::create(*f.alice.public_key(), 3, MemoryLedger::genesis(), FEE, &payload);
        let (hash, _) = tx.sign(&f.alice);
        assert!(matches!(f.process(&tx, &hash), Status::InFuture(_)));

        f.ledger.accounts.get_mut(f.alice.public_key()).unwrap().seq = 5;
        assert!(matches!(f.process(&tx, &hash), Status::AlreadyHave(_)));
    }

    #[test]
    fn test_unknown_sender() {
        let mut f = Fixture::new();
        let stranger = Keypair::generate(&mut OsRng);
        let bob = f.bob.clone();
        assert_eq!(f.send(&stranger, transfer(&bob, 1)), Status::invalid("Sender account not found"));
    }

    #[test]
    fn test_insufficient_funds() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());
        assert_eq!(f.send(&alice, transfer(&bob, 20_000 * COIN)), Status::invalid("Insufficient funds"));
    }

    #[test]
    fn test_burn_reduces_supply() {
        let mut f = Fixture::new();
        let alice = f.alice.clone();
        let status = f.send(&alice, TxData::Burn(Burn { amount: 5 * COIN, message: b"bye".to_vec() }));
        assert_eq!(status, Status::Accepted);
        assert_eq!(f.ledger.supply, -5 * COIN);
    }

    #[test]
    fn test_lease_lifecycle() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());
        let height = f.ledger.height;

        let small = TxData::Lease(LeaseTx { amount: MIN_LEASE - 1, to: *bob.public_key() });
        assert!(matches!(f.send(&alice, small), Status::Invalid(_)));

        let lease = TxData::Lease(LeaseTx { amount: 1500 * COIN, to: *bob.public_key() });
        assert_eq!(f.send(&alice, lease), Status::Accepted);
        assert_eq!(f.account(bob.public_key()).leases.len(), 1);

        let withdraw = TxData::WithdrawFromLease(WithdrawFromLease {
            withdraw: 500 * COIN,
            amount: 1500 * COIN,
            to: *bob.public_key(),
            height,
        });
        assert_eq!(f.send(&alice, withdraw), Status::Accepted);
        assert_eq!(f.account(bob.public_key()).leases[0].amount, 1000 * COIN);

        let cancel = TxData::CancelLease(CancelLease { amount: 1000 * COIN, to: *bob.public_key(), height });
        assert_eq!(f.send(&alice, cancel.clone()), Status::Accepted);
        assert!(f.account(bob.public_key()).leases.is_empty());
        assert_eq!(f.send(&alice, cancel), Status::invalid("Lease not found"));
    }

    #[test]
    fn test_bundle() {
        let mut f = Fixture::new();
        let alice = f.alice.clone();
        let bundle = TxData::Bundle(Bundle { magic: 0xB1, data: vec![1, 2, 3] });
        assert_eq!(f.send(&alice, bundle), Status::Accepted);
    }

    #[test]
    fn test_htlc_claim() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());
        let create = TxData::CreateHtlc(CreateHtlc {
            amount: 10 * COIN,
            to: *bob.public_key(),
            time_lock: TimeLock::new(TimeLockKind::Height, 1_000_000),
            hash_lock: HashLock::from_preimage(HashAlgorithm::Sha256, b"secret"),
        });
        let (tx, hash) = f.signed(&alice, &create);
        assert_eq!(f.process(&tx, &hash), Status::Accepted);
        let id = contract_id(&hash, 0);
        assert!(f.ledger.htlcs.contains_key(&id));

        let wrong = TxData::ClaimHtlc(ClaimHtlc { id, preimage: b"guess".to_vec() });
        assert_eq!(f.send(&bob, wrong), Status::invalid("Invalid preimage"));

        let refund = TxData::RefundHtlc(RefundHtlc { id });
        assert!(matches!(f.send(&alice, refund), Status::InFuture(_)));

        let claim = TxData::ClaimHtlc(ClaimHtlc { id, preimage: b"secret".to_vec() });
        assert_eq!(f.send(&alice, claim.clone()), Status::invalid("Invalid sender"));
        assert_eq!(f.send(&bob, claim), Status::Accepted);
        assert!(f.ledger.htlcs.is_empty());
        assert_eq!(f.account(bob.public_key()).balance(), 5_010 * COIN - FEE);
    }

    #[test]
    fn test_htlc_ripemd160_claim() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());
        let short = TxData::CreateHtlc(CreateHtlc {
            amount: COIN,
            to: *bob.public_key(),
            time_lock: TimeLock::new(TimeLockKind::Height, 1_000_000),
            hash_lock: HashLock::new(HashAlgorithm::Ripemd160, vec![0; 32]),
        });
        assert!(matches!(f.send(&alice, short), Status::Invalid(_)));

        let create = TxData::CreateHtlc(CreateHtlc {
            amount: COIN,
            to: *bob.public_key(),
            time_lock: TimeLock::new(TimeLockKind::Height, 1_000_000),
            hash_lock: HashLock::from_preimage(HashAlgorithm::Ripemd160, b"secret"),
        });
        let (tx, hash) = f.signed(&alice, &create);
        assert_eq!(f.process(&tx, &hash), Status::Accepted);
        let id = contract_id(&hash, 0);
        assert_eq!(f.ledger.htlcs[&id].hash_lock.image.len(), 20);

        let claim = TxData::ClaimHtlc(ClaimHtlc { id, preimage: b"secret".to_vec() });
        assert_eq!(f.send(&bob, claim), Status::Accepted);
        assert!(f.ledger.htlcs.is_empty());
    }

    #[test]
    fn test_htlc_refund_after_expiry() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());
        let create = TxData::CreateHtlc(CreateHtlc {
            amount: COIN,
            to: *bob.public_key(),
            time_lock: TimeLock::new(TimeLockKind::RelativeHeight, 2),
            hash_lock: HashLock::from_preimage(HashAlgorithm::Blake2b256, b"x"),
        });
        let (tx, hash) = f.signed(&alice, &create);
        assert_eq!(f.process(&tx, &hash), Status::Accepted);

        f.ledger.height += 3;
        let refund = TxData::RefundHtlc(RefundHtlc { id: contract_id(&hash, 0) });
        assert_eq!(f.send(&alice, refund), Status::Accepted);
    }

    #[test]
    fn test_htlc_bad_hash_lock() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());
        let create = TxData::CreateHtlc(CreateHtlc {
            amount: COIN,
            to: *bob.public_key(),
            time_lock: TimeLock::new(TimeLockKind::Time, 0),
            hash_lock: HashLock::new(HashAlgorithm::Keccak256, vec![0; 5]),
        });
        assert!(matches!(f.send(&alice, create), Status::Invalid(_)));
    }

    fn create_multisig(f: &Fixture, n: u8, amounts: [Amount; 2], sign: bool) -> (Transaction, Hash256) {
        let (alice, bob) = (&f.alice, &f.bob);
        let mut create = CreateMultisig {
            n,
            deposits: vec![
                Deposit { from: *alice.public_key(), amount: amounts[0] },
                Deposit { from: *bob.public_key(), amount: amounts[1] },
            ],
            signatures: Vec::new(),
        };
        let seq = f.seq(alice.public_key());
        if sign {
            create.sign_deposit(0, alice, alice.public_key(), seq, 0);
            create.sign_deposit(1, bob, alice.public_key(), seq, 0);
        }
        f.signed(alice, &TxData::CreateMultisig(create))
    }

    #[test]
    fn test_multisig_create_and_spend() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());

        let (tx, hash) = create_multisig(&f, 2, [30 * COIN, 20 * COIN], true);
        assert_eq!(f.process(&tx, &hash), Status::Accepted);
        let id = contract_id(&hash, 0);
        assert_eq!(f.ledger.multisigs[&id].amount(), 50 * COIN);
        assert_eq!(f.account(bob.public_key()).balance(), 4_980 * COIN);

        let mut spend = SpendMultisig { id, amounts: vec![10 * COIN, 40 * COIN], signatures: Vec::new() };
        spend.sign(1, &bob);
        assert_eq!(f.send(&bob, TxData::SpendMultisig(spend.clone())), Status::invalid("Invalid sender"));
        assert_eq!(f.send(&alice, TxData::SpendMultisig(spend)), Status::Accepted);
        assert!(f.ledger.multisigs.is_empty());
        assert_eq!(f.account(bob.public_key()).balance(), 5_020 * COIN);
    }

    #[test]
    fn test_multisig_spend_rejects_bad_totals_and_duplicates() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());
        let (tx, hash) = create_multisig(&f, 2, [30 * COIN, 20 * COIN], true);
        assert_eq!(f.process(&tx, &hash), Status::Accepted);
        let id = contract_id(&hash, 0);

        let mut spend = SpendMultisig { id, amounts: vec![10 * COIN, 10 * COIN], signatures: Vec::new() };
        spend.sign(1, &bob);
        assert_eq!(f.send(&alice, TxData::SpendMultisig(spend)), Status::invalid("Invalid total amount"));

        let mut spend = SpendMultisig { id, amounts: vec![25 * COIN, 25 * COIN], signatures: Vec::new() };
        spend.sign(1, &bob);
        spend.sign(1, &bob);
        assert_eq!(f.send(&alice, TxData::SpendMultisig(spend)), Status::invalid("Duplicate signature 1"));

        let spend = SpendMultisig { id, amounts: vec![25 * COIN, 25 * COIN], signatures: Vec::new() };
        assert_eq!(
            f.send(&alice, TxData::SpendMultisig(spend)),
            Status::invalid("Invalid number of signatures")
        );
    }

    #[test]
    fn test_multisig_create_validation() {
        let mut f = Fixture::new();
        let (tx, hash) = create_multisig(&f, 3, [COIN, COIN], true);
        assert_eq!(f.process(&tx, &hash), Status::invalid("Invalid n"));

        let (tx, hash) = create_multisig(&f, 1, [COIN, COIN], false);
        assert_eq!(f.process(&tx, &hash), Status::invalid("Unsigned deposit 0"));

        let (tx, hash) = create_multisig(&f, 1, [0, 0], false);
        assert_eq!(f.process(&tx, &hash), Status::invalid("Invalid total amount"));

        let (tx, hash) = create_multisig(&f, 1, [COIN, 6_000 * COIN], true);
        assert_eq!(
            f.process(&tx, &hash),
            Status::invalid("CreateMultisig at index 1: Insufficient funds")
        );
    }

    #[test]
    fn test_batch() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());
        let batch = TxData::Batch(Batch {
            items: vec![BatchItem::new(&transfer(&bob, COIN)), BatchItem::new(&transfer(&bob, 2 * COIN))],
        });
        assert_eq!(f.send(&alice, batch), Status::Accepted);
        assert_eq!(f.account(bob.public_key()).immature.len(), 2);

        let nested = TxData::Batch(Batch {
            items: vec![BatchItem::new(&TxData::Batch(Batch { items: Vec::new() }))],
        });
        assert_eq!(f.send(&alice, nested), Status::invalid("Nested batch"));

        let failing = TxData::Batch(Batch {
            items: vec![BatchItem::new(&transfer(&bob, COIN)), BatchItem::new(&transfer(&bob, 1_000_000 * COIN))],
        });
        assert_eq!(f.send(&alice, failing), Status::invalid("Batch item 1: Insufficient funds"));
    }

    #[test]
    fn test_prune_and_sequence_on_accept() {
        let mut f = Fixture::new();
        let (alice, bob) = (f.alice.clone(), f.bob.clone());
        f.ledger.accounts.get_mut(alice.public_key()).unwrap().debit(1, 7);

        assert_eq!(f.send(&alice, transfer(&bob, 1)), Status::Accepted);
        let a = f.account(alice.public_key());
        assert!(a.immature.is_empty());
        assert_eq!(a.seq, 1);
    }
}
