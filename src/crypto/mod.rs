//! Cryptographic primitives
//!
//! - `hash`: BLAKE2b-256 and the hash-lock digests
//! - `signatures`: Ed25519 keys and signatures

pub mod hash;
pub mod signatures;
