//! Block layout
//!
//! ```text
//! header: version u32 | previous[32] | time i64 | generator[32] | content_hash[32] | signature[64]
//! body:   varint count | varbytes(tx)...
//! ```
//!
//! - block hash = BLAKE2b-256 over the header without the signature
//! - content hash = BLAKE2b-256 over the body

use crate::codec::{Decode, DecodeResult, Decoder, Encode, Encoder};
use crate::constants::BLOCK_VERSION;
use crate::crypto::hash::blake2b_256;
use crate::crypto::signatures::{self, Keypair, PublicKey, Signature};
use crate::structures::types::{Hash256, Timestamp};

pub const CONTENT_HASH_POS: usize = 4 + 32 + 8 + 32;
pub const SIGNATURE_POS: usize = CONTENT_HASH_POS + 32;
pub const HEADER_SIZE: usize = SIGNATURE_POS + 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub version: u32,
    pub previous: Hash256,
    pub time: Timestamp,
    pub generator: PublicKey,
    pub content_hash: Hash256,
    pub signature: Signature,
    /// Serialized transactions in block order
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    /// Empty unsigned block on top of `previous`
    pub fn create(previous: Hash256, time: Timestamp, generator: PublicKey) -> Self {
        Self {
            version: BLOCK_VERSION,
            previous,
            time,
            generator,
            content_hash: Hash256::ZERO,
            signature: Signature::EMPTY,
            transactions: Vec::new(),
        }
    }

    pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
        blake2b_256(bytes.get(..SIGNATURE_POS).unwrap_or(bytes))
    }

    pub fn content_hash_bytes(bytes: &[u8]) -> Hash256 {
        blake2b_256(bytes.get(HEADER_SIZE..).unwrap_or_default())
    }

    fn body_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.list(&self.transactions);
        enc.finish()
    }

    /// Fill in the content hash and signature; returns the hash and the signed bytes.
    pub fn sign(&mut self, keypair: &Keypair) -> (Hash256, Vec<u8>) {
        self.content_hash = blake2b_256(&self.body_bytes());
        self.signature = Signature::EMPTY;
        let mut bytes = self.to_bytes();
        let hash = Self::hash_bytes(&bytes);
        self.signature = keypair.sign(&hash);
        bytes[SIGNATURE_POS..HEADER_SIZE].copy_from_slice(self.signature.as_bytes());
        (hash, bytes)
    }

    pub fn verify_signature(&self, hash: &Hash256) -> bool {
        signatures::verify(&self.generator, hash, &self.signature)
    }

    pub fn verify_content_hash(&self, bytes: &[u8]) -> bool {
        self.content_hash == Self::content_hash_bytes(bytes)
    }
}

impl Encode for Block {
    fn encode(&self, enc: &mut Encoder) {
        enc.u32(self.version)
            .item(&self.previous)
            .i64(self.time)
            .item(&self.generator)
            .item(&self.content_hash)
            .item(&self.signature)
            .list(&self.transactions);
    }
}

impl Decode for Block {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self {
            version: dec.u32()?,
            previous: dec.item()?,
            time: dec.i64()?,
            generator: dec.item()?,
            content_hash: dec.item()?,
            signature: dec.item()?,
            transactions: dec.list()?,
        })
    }
}
