//! Contract records created by transactions
//!
//! Both HTLCs and multisigs are keyed by `contract_id(tx_hash, data_index)`
//! and live in the ledger next to accounts.

use crate::codec::{Decode, DecodeError, DecodeResult, Decoder, Encode, Encoder};
use crate::crypto::hash::{blake2b_256, blake2b_256_parts, keccak256, ripemd160, sha256};
use crate::crypto::signatures::PublicKey;
use crate::structures::types::{Amount, Hash256, Height, Timestamp};

/// Identifier of an HTLC or multisig
pub type ContractId = Hash256;

/// Id of the contract created by payload `data_index` of transaction `tx_hash`
pub fn contract_id(tx_hash: &Hash256, data_index: u32) -> ContractId {
    blake2b_256_parts(&[tx_hash.as_bytes(), &data_index.to_be_bytes()])
}

// ============================================================================
// Time lock
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimeLockKind {
    Time = 0,
    Height = 1,
    RelativeTime = 2,
    RelativeHeight = 3,
}

impl TryFrom<u8> for TimeLockKind {
    type Error = DecodeError;

    fn try_from(tag: u8) -> DecodeResult<Self> {
        match tag {
            0 => Ok(Self::Time),
            1 => Ok(Self::Height),
            2 => Ok(Self::RelativeTime),
            3 => Ok(Self::RelativeHeight),
            tag => Err(DecodeError::UnknownTag { kind: "time lock", tag }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLock {
    pub kind: TimeLockKind,
    pub data: i64,
}

impl TimeLock {
    pub fn new(kind: TimeLockKind, data: i64) -> Self {
        Self { kind, data }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.data < 0 {
            return Err(format!("Negative time lock {}", self.data));
        }
        Ok(())
    }

    /// Whether the lock has expired at (`height`, `time`) for a contract
    /// created at (`created_height`, `created_time`).
    pub fn verify(&self, created_height: Height, created_time: Timestamp, height: Height, time: Timestamp) -> bool {
        match self.kind {
            TimeLockKind::Time => self.data < time,
            TimeLockKind::Height => self.data < height as i64,
            TimeLockKind::RelativeTime => created_time.saturating_add(self.data) < time,
            TimeLockKind::RelativeHeight => (created_height as i64).saturating_add(self.data) < height as i64,
        }
    }
}

impl Encode for TimeLock {
    fn encode(&self, enc: &mut Encoder) {
        enc.u8(self.kind as u8).i64(self.data);
    }
}

impl Decode for TimeLock {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let kind = TimeLockKind::try_from(dec.u8()?)?;
        Ok(Self { kind, data: dec.i64()? })
    }
}

// ============================================================================
// Hash lock
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HashAlgorithm {
    Blake2b256 = 0,
    Sha256 = 1,
    Keccak256 = 2,
    Ripemd160 = 3,
}

impl TryFrom<u8> for HashAlgorithm {
    type Error = DecodeError;

    fn try_from(tag: u8) -> DecodeResult<Self> {
        match tag {
            0 => Ok(Self::Blake2b256),
            1 => Ok(Self::Sha256),
            2 => Ok(Self::Keccak256),
            3 => Ok(Self::Ripemd160),
            tag => Err(DecodeError::UnknownTag { kind: "hash algorithm", tag }),
        }
    }
}

impl HashAlgorithm {
    pub fn digest(&self, preimage: &[u8]) -> Vec<u8> {
        match self {
            Self::Blake2b256 => blake2b_256(preimage).0.to_vec(),
            Self::Sha256 => sha256(preimage).to_vec(),
            Self::Keccak256 => keccak256(preimage).to_vec(),
            Self::Ripemd160 => ripemd160(preimage).to_vec(),
        }
    }

    /// Image length in bytes
    pub fn output_len(&self) -> usize {
        match self {
            Self::Ripemd160 => 20,
            _ => 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashLock {
    pub algorithm: HashAlgorithm,
    pub image: Vec<u8>,
}

impl HashLock {
    pub fn new(algorithm: HashAlgorithm, image: Vec<u8>) -> Self {
        Self { algorithm, image }
    }

    /// Lock whose image is the digest of `preimage`
    pub fn from_preimage(algorithm: HashAlgorithm, preimage: &[u8]) -> Self {
        Self::new(algorithm, algorithm.digest(preimage))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.image.len() != self.algorithm.output_len() {
            return Err(format!("Invalid {:?} image length {}", self.algorithm, self.image.len()));
        }
        Ok(())
    }

    pub fn verify(&self, preimage: &[u8]) -> bool {
        self.algorithm.digest(preimage) == self.image
    }
}

impl Encode for HashLock {
    fn encode(&self, enc: &mut Encoder) {
        enc.u8(self.algorithm as u8).bytes(&self.image);
    }
}

impl Decode for HashLock {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let algorithm = HashAlgorithm::try_from(dec.u8()?)?;
        Ok(Self { algorithm, image: dec.bytes()? })
    }
}

// ============================================================================
// HTLC
// ============================================================================

/// Hash-time-locked contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Htlc {
    pub height: Height,
    pub time: Timestamp,
    pub amount: Amount,
    pub from: PublicKey,
    pub to: PublicKey,
    pub time_lock: TimeLock,
    pub hash_lock: HashLock,
}

impl Encode for Htlc {
    fn encode(&self, enc: &mut Encoder) {
        enc.u32(self.height)
            .i64(self.time)
            .i64(self.amount)
            .item(&self.from)
            .item(&self.to)
            .item(&self.time_lock)
            .item(&self.hash_lock);
    }
}

impl Decode for Htlc {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self {
            height: dec.u32()?,
            time: dec.i64()?,
            amount: dec.i64()?,
            from: dec.item()?,
            to: dec.item()?,
            time_lock: dec.item()?,
            hash_lock: dec.item()?,
        })
    }
}

// ============================================================================
// Multisig
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deposit {
    pub from: PublicKey,
    pub amount: Amount,
}

impl Encode for Deposit {
    fn encode(&self, enc: &mut Encoder) {
        enc.item(&self.from).i64(self.amount);
    }
}

impl Decode for Deposit {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { from: dec.item()?, amount: dec.i64()? })
    }
}

/// `n`-of-deposits escrow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multisig {
    pub n: u8,
    pub deposits: Vec<Deposit>,
}

impl Multisig {
    pub fn amount(&self) -> Amount {
        self.deposits.iter().map(|d| d.amount).sum()
    }
}

impl Encode for Multisig {
    fn encode(&self, enc: &mut Encoder) {
        enc.u8(self.n).list(&self.deposits);
    }
}

impl Decode for Multisig {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { n: dec.u8()?, deposits: dec.list()? })
    }
}
