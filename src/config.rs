//! Node configuration
//!
//! Plain serde structs with defaults. Loading them from a file or the
//! command line is left to the embedding binary.

use crate::constants::{DEFAULT_MAX_BLOCK_SIZE, INITIAL_DIFFICULTY_BYTES};
use crate::crypto::signatures::PublicKey;
use crate::structures::types::{Amount, Timestamp};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Byte cap for pending transactions; remote submissions over it are refused
    pub max_size_bytes: usize,
    /// Minimum fee per started kilobyte
    pub min_fee_rate: Amount,
    /// Upper bound on block size used when filling a candidate block
    pub soft_block_size_limit: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 128 * 1024 * 1024,
            min_fee_rate: 100_000,
            soft_block_size_limit: DEFAULT_MAX_BLOCK_SIZE as usize,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub public_key: PublicKey,
    pub amount: Amount,
}

/// Initial chain state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genesis {
    pub time: Timestamp,
    pub balances: Vec<GenesisBalance>,
    /// Hex-encoded big-endian starting difficulty
    #[serde(default, with = "biguint_hex")]
    pub difficulty: Option<BigUint>,
}

impl Genesis {
    pub fn new(time: Timestamp, balances: Vec<GenesisBalance>) -> Self {
        Self { time, balances, difficulty: None }
    }

    pub fn with_difficulty(mut self, difficulty: BigUint) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn difficulty(&self) -> BigUint {
        self.difficulty
            .clone()
            .unwrap_or_else(|| BigUint::from_bytes_be(&INITIAL_DIFFICULTY_BYTES))
    }
}

mod biguint_hex {
    use num_bigint::BigUint;
    use num_traits::Zero;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<BigUint>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_str_radix(16)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<BigUint>, D::Error> {
        let Some(s) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        match BigUint::parse_bytes(s.as_bytes(), 16) {
            Some(v) if v.is_zero() => Err(serde::de::Error::custom("difficulty must be positive")),
            Some(v) => Ok(Some(v)),
            None => Err(serde::de::Error::custom(format!("invalid hex difficulty {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"pool": {"min_fee_rate": 5}}"#).unwrap();
        assert_eq!(config.pool.min_fee_rate, 5);
        assert_eq!(config.pool.max_size_bytes, 128 * 1024 * 1024);
        assert_eq!(config.pool.soft_block_size_limit, DEFAULT_MAX_BLOCK_SIZE as usize);
    }

    #[test]
    fn test_genesis_parse() {
        let key = "11".repeat(32);
        let json = format!(
            r#"{{"time": 1000, "balances": [{{"public_key": "{key}", "amount": 7}}], "difficulty": "ff"}}"#
        );
        let genesis: Genesis = serde_json::from_str(&json).unwrap();
        assert_eq!(genesis.balances[0].public_key, PublicKey([0x11; 32]));
        assert_eq!(genesis.difficulty(), BigUint::from(255u32));
    }

    #[test]
    fn test_genesis_zero_difficulty_rejected() {
        let json = r#"{"time": 0, "balances": [], "difficulty": "0"}"#;
        assert!(serde_json::from_str::<Genesis>(json).is_err());
        let json = r#"{"time": 0, "balances": [], "difficulty": "zz"}"#;
        assert!(serde_json::from_str::<Genesis>(json).is_err());
    }

    #[test]
    fn test_genesis_default_difficulty() {
        let genesis = Genesis::new(0, Vec::new());
        assert_eq!(genesis.difficulty(), BigUint::from_bytes_be(&INITIAL_DIFFICULTY_BYTES));
    }
}
