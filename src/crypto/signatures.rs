//! Ed25519 Signatures
//!
//! Thin wrapper around ed25519-dalek:
//! - Key generation
//! - Signing a 32-byte hash
//! - Signature verification
//!
//! Transactions and blocks sign their hash, never the raw bytes.

use crate::codec::{Decode, DecodeResult, Decoder, Encode, Encoder};
use crate::structures::types::Hash256;
use crate::{Error, Result};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

/// 32-byte secret key
#[derive(Clone)]
pub struct SecretKey(Zeroizing<[u8; 32]>);

impl SecretKey {
    /// Generate random secret key
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        rng.fill_bytes(&mut *bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(Zeroizing::new(*bytes))
    }

    /// Get bytes (use carefully - exposes secret)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive public key
    pub fn public_key(&self) -> PublicKey {
        let signing_key = SigningKey::from_bytes(&self.0);
        PublicKey(signing_key.verifying_key().to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// 32-byte public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(*bytes)
    }

    pub fn try_from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = slice
            .try_into()
            .map_err(|_| Error::InvalidInput("Public key must be 32 bytes".into()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::try_from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

impl Encode for PublicKey {
    fn encode(&self, enc: &mut Encoder) {
        enc.raw(&self.0);
    }
}

impl Decode for PublicKey {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self(dec.array()?))
    }
}

/// 64-byte Ed25519 signature
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// All-zero placeholder written before signing
    pub const EMPTY: Self = Self([0u8; 64]);

    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(*bytes)
    }

    pub fn try_from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; 64] = slice
            .try_into()
            .map_err(|_| Error::InvalidInput("Signature must be 64 bytes".into()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0[..8]))
    }
}

impl Encode for Signature {
    fn encode(&self, enc: &mut Encoder) {
        enc.raw(&self.0);
    }
}

impl Decode for Signature {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        Ok(Self(dec.array()?))
    }
}

/// Keypair for signing operations
#[derive(Clone)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate new random keypair
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        Self::from_secret(SecretKey::generate(rng))
    }

    /// Create from secret key bytes
    pub fn from_secret_key(sk_bytes: &[u8; 32]) -> Self {
        Self::from_secret(SecretKey::from_bytes(sk_bytes))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Sign a hash
    pub fn sign(&self, hash: &Hash256) -> Signature {
        let signing_key = SigningKey::from_bytes(self.secret.as_bytes());
        Signature(signing_key.sign(hash.as_bytes()).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Check a signature over a hash. Malformed keys simply fail verification.
pub fn verify(public_key: &PublicKey, hash: &Hash256, signature: &Signature) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let sig = Ed25519Signature::from_bytes(&signature.0);
    verifying_key.verify(hash.as_bytes(), &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::blake2b_256;
    use rand::rngs::OsRng;

    #[test]
    fn test_sign_verify() {
        let kp = Keypair::generate(&mut OsRng);
        let hash = blake2b_256(b"stake");

        let sig = kp.sign(&hash);
        assert!(verify(kp.public_key(), &hash, &sig));
    }

    #[test]
    fn test_wrong_hash_fails() {
        let kp = Keypair::generate(&mut OsRng);
        let sig = kp.sign(&blake2b_256(b"one"));

        assert!(!verify(kp.public_key(), &blake2b_256(b"two"), &sig));
    }

    #[test]
    fn test_wrong_key_fails() {
        let kp1 = Keypair::generate(&mut OsRng);
        let kp2 = Keypair::generate(&mut OsRng);
        let hash = blake2b_256(b"message");

        assert!(!verify(kp2.public_key(), &hash, &kp1.sign(&hash)));
    }

    #[test]
    fn test_empty_signature_fails() {
        let kp = Keypair::from_secret_key(&[7u8; 32]);
        assert!(!verify(kp.public_key(), &Hash256::ZERO, &Signature::EMPTY));
    }

    #[test]
    fn test_deterministic_signature() {
        let kp = Keypair::from_secret_key(&[42u8; 32]);
        let hash = blake2b_256(b"deterministic");

        assert_eq!(kp.sign(&hash), kp.sign(&hash));
    }

    #[test]
    fn test_public_key_slice_length() {
        assert!(PublicKey::try_from_slice(&[0u8; 31]).is_err());
        assert!(PublicKey::try_from_slice(&[0u8; 32]).is_ok());
    }
}
