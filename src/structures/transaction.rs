//! Transaction envelope and payload kinds
//!
//! Wire layout:
//!
//! ```text
//! signature[64] | from[32] | seq u32 | anchor[32] | fee i64 | type u8 | varbytes(payload)
//! ```
//!
//! The hash covers everything after the signature. Signing hashes the bytes
//! with a zeroed signature and then writes the signature into the first 64
//! bytes in place.

use crate::codec::{Decode, DecodeError, DecodeResult, Decoder, Encode, Encoder};
use crate::crypto::hash::{blake2b_256, blake2b_256_parts};
use crate::crypto::signatures::{self, Keypair, PublicKey, Signature};
use crate::structures::contract::{ContractId, Deposit, HashLock, TimeLock};
use crate::structures::types::{Amount, Hash256, Height};

pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signature: Signature,
    pub from: PublicKey,
    pub seq: u32,
    pub anchor: Hash256,
    pub fee: Amount,
    pub tx_type: u8,
    pub data: Vec<u8>,
}

impl Transaction {
    /// Unsigned transaction carrying `payload`
    pub fn create(from: PublicKey, seq: u32, anchor: Hash256, fee: Amount, payload: &TxData) -> Self {
        Self {
            signature: Signature::EMPTY,
            from,
            seq,
            anchor,
            fee,
            tx_type: payload.tx_type() as u8,
            data: payload.payload_bytes(),
        }
    }

    /// Hash of serialized transaction bytes
    pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
        blake2b_256(bytes.get(SIGNATURE_LEN..).unwrap_or_default())
    }

    pub fn hash(&self) -> Hash256 {
        Self::hash_bytes(&self.to_bytes())
    }

    /// Sign in place; returns the hash and the signed bytes.
    pub fn sign(&mut self, keypair: &Keypair) -> (Hash256, Vec<u8>) {
        self.signature = Signature::EMPTY;
        let mut bytes = self.to_bytes();
        let hash = Self::hash_bytes(&bytes);
        self.signature = keypair.sign(&hash);
        bytes[..SIGNATURE_LEN].copy_from_slice(self.signature.as_bytes());
        (hash, bytes)
    }

    pub fn verify_signature(&self, hash: &Hash256) -> bool {
        signatures::verify(&self.from, hash, &self.signature)
    }

    /// Decode the type-tagged payload
    pub fn payload(&self) -> DecodeResult<TxData> {
        TxData::decode_payload(self.tx_type, &self.data)
    }
}

impl Encode for Transaction {
    fn encode(&self, enc: &mut Encoder) {
        enc.item(&self.signature)
            .item(&self.from)
            .u32(self.seq)
            .item(&self.anchor)
            .i64(self.fee)
            .u8(self.tx_type)
            .bytes(&self.data);
    }
}

impl Decode for Transaction {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self {
            signature: dec.item()?,
            from: dec.item()?,
            seq: dec.u32()?,
            anchor: dec.item()?,
            fee: dec.i64()?,
            tx_type: dec.u8()?,
            data: dec.bytes()?,
        })
    }
}

// ============================================================================
// Payload kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxType {
    Transfer = 0,
    Burn = 1,
    Lease = 2,
    CancelLease = 3,
    Bundle = 4,
    CreateHtlc = 5,
    ClaimHtlc = 6,
    RefundHtlc = 7,
    CreateMultisig = 9,
    SpendMultisig = 10,
    WithdrawFromLease = 11,
    Batch = 16,
}

impl TryFrom<u8> for TxType {
    type Error = DecodeError;

    fn try_from(tag: u8) -> DecodeResult<Self> {
        Ok(match tag {
            0 => Self::Transfer,
            1 => Self::Burn,
            2 => Self::Lease,
            3 => Self::CancelLease,
            4 => Self::Bundle,
            5 => Self::CreateHtlc,
            6 => Self::ClaimHtlc,
            7 => Self::RefundHtlc,
            9 => Self::CreateMultisig,
            10 => Self::SpendMultisig,
            11 => Self::WithdrawFromLease,
            16 => Self::Batch,
            tag => return Err(DecodeError::UnknownTag { kind: "transaction type", tag }),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub amount: Amount,
    pub to: PublicKey,
    pub message: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Burn {
    pub amount: Amount,
    pub message: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseTx {
    pub amount: Amount,
    pub to: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelLease {
    pub amount: Amount,
    pub to: PublicKey,
    pub height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawFromLease {
    pub withdraw: Amount,
    pub amount: Amount,
    pub to: PublicKey,
    pub height: Height,
}

/// Opaque application data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub magic: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateHtlc {
    pub amount: Amount,
    pub to: PublicKey,
    pub time_lock: TimeLock,
    pub hash_lock: HashLock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimHtlc {
    pub id: ContractId,
    pub preimage: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundHtlc {
    pub id: ContractId,
}

/// Signature by deposit or participant `index`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedSignature {
    pub index: u8,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMultisig {
    pub n: u8,
    pub deposits: Vec<Deposit>,
    pub signatures: Vec<IndexedSignature>,
}

impl CreateMultisig {
    /// Hash each non-zero depositor signs
    pub fn deposit_hash(&self, from: &PublicKey, seq: u32, data_index: u32) -> Hash256 {
        let unsigned = Self { signatures: Vec::new(), ..self.clone() };
        blake2b_256_parts(&[
            from.as_bytes(),
            &seq.to_be_bytes(),
            &data_index.to_be_bytes(),
            &unsigned.to_bytes(),
        ])
    }

    pub fn sign_deposit(&mut self, index: u8, keypair: &Keypair, from: &PublicKey, seq: u32, data_index: u32) {
        let hash = self.deposit_hash(from, seq, data_index);
        self.signatures.push(IndexedSignature { index, signature: keypair.sign(&hash) });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendMultisig {
    pub id: ContractId,
    pub amounts: Vec<Amount>,
    pub signatures: Vec<IndexedSignature>,
}

impl SpendMultisig {
    /// Hash each approving participant signs
    pub fn spend_hash(&self) -> Hash256 {
        let unsigned = Self { signatures: Vec::new(), ..self.clone() };
        blake2b_256(&unsigned.to_bytes())
    }

    pub fn sign(&mut self, index: u8, keypair: &Keypair) {
        let hash = self.spend_hash();
        self.signatures.push(IndexedSignature { index, signature: keypair.sign(&hash) });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub tx_type: u8,
    pub data: Vec<u8>,
}

impl BatchItem {
    pub fn new(payload: &TxData) -> Self {
        Self { tx_type: payload.tx_type() as u8, data: payload.payload_bytes() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub items: Vec<BatchItem>,
}

/// Closed set of transaction payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxData {
    Transfer(Transfer),
    Burn(Burn),
    Lease(LeaseTx),
    CancelLease(CancelLease),
    Bundle(Bundle),
    CreateHtlc(CreateHtlc),
    ClaimHtlc(ClaimHtlc),
    RefundHtlc(RefundHtlc),
    CreateMultisig(CreateMultisig),
    SpendMultisig(SpendMultisig),
    WithdrawFromLease(WithdrawFromLease),
    Batch(Batch),
}

impl TxData {
    pub fn tx_type(&self) -> TxType {
        match self {
            TxData::Transfer(_) => TxType::Transfer,
            TxData::Burn(_) => TxType::Burn,
            TxData::Lease(_) => TxType::Lease,
            TxData::CancelLease(_) => TxType::CancelLease,
            TxData::Bundle(_) => TxType::Bundle,
            TxData::CreateHtlc(_) => TxType::CreateHtlc,
            TxData::ClaimHtlc(_) => TxType::ClaimHtlc,
            TxData::RefundHtlc(_) => TxType::RefundHtlc,
            TxData::CreateMultisig(_) => TxType::CreateMultisig,
            TxData::SpendMultisig(_) => TxType::SpendMultisig,
            TxData::WithdrawFromLease(_) => TxType::WithdrawFromLease,
            TxData::Batch(_) => TxType::Batch,
        }
    }

    /// Encoding of the payload alone, without the type tag
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        match self {
            TxData::Transfer(d) => d.encode(&mut enc),
            TxData::Burn(d) => d.encode(&mut enc),
            TxData::Lease(d) => d.encode(&mut enc),
            TxData::CancelLease(d) => d.encode(&mut enc),
            TxData::Bundle(d) => d.encode(&mut enc),
            TxData::CreateHtlc(d) => d.encode(&mut enc),
            TxData::ClaimHtlc(d) => d.encode(&mut enc),
            TxData::RefundHtlc(d) => d.encode(&mut enc),
            TxData::CreateMultisig(d) => d.encode(&mut enc),
            TxData::SpendMultisig(d) => d.encode(&mut enc),
            TxData::WithdrawFromLease(d) => d.encode(&mut enc),
            TxData::Batch(d) => d.encode(&mut enc),
        }
        enc.finish()
    }

    pub fn decode_payload(tx_type: u8, bytes: &[u8]) -> DecodeResult<Self> {
        Ok(match TxType::try_from(tx_type)? {
            TxType::Transfer => TxData::Transfer(Transfer::from_bytes(bytes)?),
            TxType::Burn => TxData::Burn(Burn::from_bytes(bytes)?),
            TxType::Lease => TxData::Lease(LeaseTx::from_bytes(bytes)?),
            TxType::CancelLease => TxData::CancelLease(CancelLease::from_bytes(bytes)?),
            TxType::Bundle => TxData::Bundle(Bundle::from_bytes(bytes)?),
            TxType::CreateHtlc => TxData::CreateHtlc(CreateHtlc::from_bytes(bytes)?),
            TxType::ClaimHtlc => TxData::ClaimHtlc(ClaimHtlc::from_bytes(bytes)?),
            TxType::RefundHtlc => TxData::RefundHtlc(RefundHtlc::from_bytes(bytes)?),
            TxType::CreateMultisig => TxData::CreateMultisig(CreateMultisig::from_bytes(bytes)?),
            TxType::SpendMultisig => TxData::SpendMultisig(SpendMultisig::from_bytes(bytes)?),
            TxType::WithdrawFromLease => TxData::WithdrawFromLease(WithdrawFromLease::from_bytes(bytes)?),
            TxType::Batch => TxData::Batch(Batch::from_bytes(bytes)?),
        })
    }
}

// ============================================================================
// Payload encoding
// ============================================================================

fn decode_height(dec: &mut Decoder<'_>) -> DecodeResult<Height> {
    dec.u32()
}

impl Encode for Transfer {
    fn encode(&self, enc: &mut Encoder) {
        enc.i64(self.amount).item(&self.to).bytes(&self.message);
    }
}

impl Decode for Transfer {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { amount: dec.i64()?, to: dec.item()?, message: dec.bytes()? })
    }
}

impl Encode for Burn {
    fn encode(&self, enc: &mut Encoder) {
        enc.i64(self.amount).bytes(&self.message);
    }
}

impl Decode for Burn {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { amount: dec.i64()?, message: dec.bytes()? })
    }
}

impl Encode for LeaseTx {
    fn encode(&self, enc: &mut Encoder) {
        enc.i64(self.amount).item(&self.to);
    }
}

impl Decode for LeaseTx {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { amount: dec.i64()?, to: dec.item()? })
    }
}

impl Encode for CancelLease {
    fn encode(&self, enc: &mut Encoder) {
        enc.i64(self.amount).item(&self.to).u32(self.height);
    }
}

impl Decode for CancelLease {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { amount: dec.i64()?, to: dec.item()?, height: decode_height(dec)? })
    }
}

impl Encode for WithdrawFromLease {
    fn encode(&self, enc: &mut Encoder) {
        enc.i64(self.withdraw).i64(self.amount).item(&self.to).u32(self.height);
    }
}

impl Decode for WithdrawFromLease {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self {
            withdraw: dec.i64()?,
            amount: dec.i64()?,
            to: dec.item()?,
            height: decode_height(dec)?,
        })
    }
}

impl Encode for Bundle {
    fn encode(&self, enc: &mut Encoder) {
        enc.u32(self.magic).bytes(&self.data);
    }
}

impl Decode for Bundle {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { magic: dec.u32()?, data: dec.bytes()? })
    }
}

impl Encode for CreateHtlc {
    fn encode(&self, enc: &mut Encoder) {
        enc.i64(self.amount)
            .item(&self.to)
            .item(&self.time_lock)
            .item(&self.hash_lock);
    }
}

impl Decode for CreateHtlc {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self {
            amount: dec.i64()?,
            to: dec.item()?,
            time_lock: dec.item()?,
            hash_lock: dec.item()?,
        })
    }
}

impl Encode for ClaimHtlc {
    fn encode(&self, enc: &mut Encoder) {
        enc.item(&self.id).bytes(&self.preimage);
    }
}

impl Decode for ClaimHtlc {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { id: dec.item()?, preimage: dec.bytes()? })
    }
}

impl Encode for RefundHtlc {
    fn encode(&self, enc: &mut Encoder) {
        enc.item(&self.id);
    }
}

impl Decode for RefundHtlc {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { id: dec.item()? })
    }
}

impl Encode for IndexedSignature {
    fn encode(&self, enc: &mut Encoder) {
        enc.u8(self.index).item(&self.signature);
    }
}

impl Decode for IndexedSignature {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { index: dec.u8()?, signature: dec.item()? })
    }
}

impl Encode for CreateMultisig {
    fn encode(&self, enc: &mut Encoder) {
        enc.u8(self.n).list(&self.deposits).list(&self.signatures);
    }
}

impl Decode for CreateMultisig {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { n: dec.u8()?, deposits: dec.list()?, signatures: dec.list()? })
    }
}

impl Encode for SpendMultisig {
    fn encode(&self, enc: &mut Encoder) {
        enc.item(&self.id).varint(self.amounts.len() as u64);
        for amount in &self.amounts {
            enc.i64(*amount);
        }
        enc.list(&self.signatures);
    }
}

impl Decode for SpendMultisig {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let id = dec.item()?;
        let count = dec.length()?;
        let mut amounts = Vec::with_capacity(count);
        for _ in 0..count {
            amounts.push(dec.i64()?);
        }
        Ok(Self { id, amounts, signatures: dec.list()? })
    }
}

impl Encode for BatchItem {
    fn encode(&self, enc: &mut Encoder) {
        enc.u8(self.tx_type).bytes(&self.data);
    }
}

impl Decode for BatchItem {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { tx_type: dec.u8()?, data: dec.bytes()? })
    }
}

impl Encode for Batch {
    fn encode(&self, enc: &mut Encoder) {
        enc.list(&self.items);
    }
}

impl Decode for Batch {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self { items: dec.list()? })
    }
}
