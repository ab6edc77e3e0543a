//! Ledger contract
//!
//! `Ledger` is the read/write view of chain state that transactions are
//! applied against. It is implemented by the transaction pool overlay and by
//! the per-block update overlay in `chain`.

mod apply;

use crate::crypto::signatures::PublicKey;
use crate::status::Status;
use crate::structures::account::AccountState;
use crate::structures::contract::{ContractId, Htlc, Multisig};
use crate::structures::transaction::Transaction;
use crate::structures::types::{Amount, Hash256, Height, Timestamp};
use crate::Result;

pub trait Ledger {
    fn add_supply(&mut self, amount: Amount);

    /// Whether `hash` is the genesis hash or a block on this chain
    fn check_anchor(&self, hash: &Hash256) -> Result<bool>;

    fn block_hash(&self) -> Hash256;

    fn block_time(&self) -> Timestamp;

    fn height(&self) -> Height;

    fn get_account(&mut self, key: &PublicKey) -> Result<Option<AccountState>>;

    fn get_or_create(&mut self, key: &PublicKey) -> Result<AccountState>;

    fn set_account(&mut self, key: &PublicKey, state: AccountState);

    fn add_htlc(&mut self, id: ContractId, htlc: Htlc);

    fn get_htlc(&mut self, id: &ContractId) -> Result<Option<Htlc>>;

    fn remove_htlc(&mut self, id: &ContractId);

    fn add_multisig(&mut self, id: ContractId, multisig: Multisig);

    fn get_multisig(&mut self, id: &ContractId) -> Result<Option<Multisig>>;

    fn remove_multisig(&mut self, id: &ContractId);

    /// Validate and apply a transaction.
    ///
    /// Checks the signature, the anchor and the fee, then hands the decoded
    /// payload to its processor. Only storage failures are returned as `Err`.
    fn process_transaction(&mut self, tx: &Transaction, hash: &Hash256) -> Result<Status> {
        if !tx.verify_signature(hash) {
            return Ok(Status::invalid("Invalid signature"));
        }
        if !self.check_anchor(&tx.anchor)? {
            return Ok(Status::NotReachable(format!("anchor {}", tx.anchor)));
        }
        if tx.fee < 0 {
            return Ok(Status::invalid("Negative fee"));
        }
        let payload = match tx.payload() {
            Ok(payload) => payload,
            Err(e) => return Ok(Status::invalid(format!("Invalid payload: {e}"))),
        };
        apply::process_envelope(self, tx, hash, &payload)
    }
}
