//! Hash functions

use crate::structures::types::Hash256;
use blake2::{digest::consts::U32, Blake2b, Digest};
use ripemd::Ripemd160;
use sha2::Sha256;
use sha3::Keccak256;

type Blake2b256 = Blake2b<U32>;

/// BLAKE2b with a 256-bit output
pub fn blake2b_256(data: &[u8]) -> Hash256 {
    Hash256(Blake2b256::digest(data).into())
}

/// BLAKE2b-256 over several parts, as if concatenated
pub fn blake2b_256_parts(parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash256(hasher.finalize().into())
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake2b_256_empty() {
        assert_eq!(
            blake2b_256(b"").to_hex(),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn test_parts_equal_concatenation() {
        assert_eq!(blake2b_256_parts(&[b"stake", b"ledger"]), blake2b_256(b"stakeledger"));
    }

    #[test]
    fn test_sha256_abc() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_keccak256_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_ripemd160_abc() {
        assert_eq!(hex::encode(ripemd160(b"abc")), "8eb208f7e05d987a9b044a8e98c6b087f15a0bfc");
    }
}
