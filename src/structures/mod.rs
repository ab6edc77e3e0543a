//! Ledger data structures
//!
//! - `types`: Hash256 and scalar aliases
//! - `account`: AccountState with immature inputs and leases
//! - `contract`: HTLC and Multisig records
//! - `transaction`: Transaction envelope and payload kinds
//! - `block`: Block layout, hashing and signing

pub mod account;
pub mod block;
pub mod contract;
pub mod transaction;
pub mod types;
