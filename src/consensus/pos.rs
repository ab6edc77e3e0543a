//! Proof-of-Stake validator
//!
//! All functions here are pure. A generator wins slot `time` when
//!
//! ```text
//! blake2b(nxtrng ‖ prev_time ‖ generator ‖ time) < difficulty × stake
//! ```
//!
//! so the chance per slot grows linearly with stake.

use crate::constants::{
    A1, A2, BLOCKS_IN_YEAR, BLOCK_SIZE_SPAN, DEFAULT_MAX_BLOCK_SIZE, INITIAL_DIFFICULTY_BYTES,
    MAX_BLOCK_SIZE, MAX_DIFFICULTY_BYTES, ROLLBACK_LIMIT, SPACING, TARGET_BLOCK_TIME, TIME_SLOT,
};
use crate::crypto::hash::blake2b_256_parts;
use crate::crypto::signatures::PublicKey;
use crate::status::Status;
use crate::structures::types::{Amount, Hash256, Timestamp};
use num_bigint::BigUint;
use num_traits::One;

pub fn initial_difficulty() -> BigUint {
    BigUint::from_bytes_be(&INITIAL_DIFFICULTY_BYTES)
}

pub fn max_difficulty() -> BigUint {
    BigUint::from_bytes_be(&MAX_DIFFICULTY_BYTES)
}

/// Check a stake proof for the slot starting at `time`
pub fn check(
    time: Timestamp,
    generator: &PublicKey,
    nxtrng: &Hash256,
    difficulty: &BigUint,
    prev_block_time: Timestamp,
    stake: Amount,
) -> Status {
    if stake <= 0 {
        return Status::invalid("Invalid stake amount");
    }
    if time % TIME_SLOT != 0 {
        return Status::invalid("Invalid time slot");
    }
    let hash = blake2b_256_parts(&[
        nxtrng.as_bytes(),
        &prev_block_time.to_be_bytes(),
        generator.as_bytes(),
        &time.to_be_bytes(),
    ]);
    let target = difficulty * BigUint::from(stake as u64);
    if BigUint::from_bytes_be(hash.as_bytes()) < target {
        Status::Accepted
    } else {
        Status::invalid("Proof of stake doesn't match difficulty")
    }
}

/// Retarget after a block at `block_time` following one at `prev_block_time`.
///
/// The observed spacing is clamped to `[0, TARGET_BLOCK_TIME * SPACING]`; a
/// spacing equal to TARGET_BLOCK_TIME leaves the difficulty unchanged.
pub fn next_difficulty(difficulty: &BigUint, prev_block_time: Timestamp, block_time: Timestamp) -> BigUint {
    let spacing = (block_time - prev_block_time).clamp(0, TARGET_BLOCK_TIME * SPACING);
    let next = difficulty * BigUint::from((A2 + 2 * spacing) as u64) / BigUint::from(A1 as u64);
    next.max(BigUint::one())
}

/// Chain weight after adding a block mined at `difficulty`
pub fn cumulative_difficulty(cumulative_difficulty: &BigUint, difficulty: &BigUint) -> BigUint {
    cumulative_difficulty + (BigUint::one() << 256u32) / difficulty
}

/// Dynamic block size limit from the recent block sizes
pub fn max_block_size<'a>(sizes: impl IntoIterator<Item = &'a u32>) -> u32 {
    let mut sizes: Vec<u32> = sizes.into_iter().copied().collect();
    if sizes.len() != BLOCK_SIZE_SPAN {
        return DEFAULT_MAX_BLOCK_SIZE;
    }
    sizes.sort_unstable();
    let size = sizes[BLOCK_SIZE_SPAN / 2] as u64 * 2;
    if size > MAX_BLOCK_SIZE as u64 {
        MAX_BLOCK_SIZE
    } else if size < DEFAULT_MAX_BLOCK_SIZE as u64 {
        DEFAULT_MAX_BLOCK_SIZE
    } else {
        size as u32
    }
}

/// Block reward: one percent of supply per year
pub fn mint(supply: Amount) -> Amount {
    supply / 100 / BLOCKS_IN_YEAR
}

/// Randomness seed for the next block
pub fn nxtrng(nxtrng: &Hash256, generator: &PublicKey) -> Hash256 {
    blake2b_256_parts(&[nxtrng.as_bytes(), generator.as_bytes()])
}

pub fn is_too_far_in_future(time: Timestamp, now: Timestamp) -> bool {
    time >= now + TIME_SLOT
}

/// Whether the chain head is too old to be the network tip
pub fn guess_initial_synchronization(block_time: Timestamp, now: Timestamp) -> bool {
    now > block_time + TARGET_BLOCK_TIME * ROLLBACK_LIMIT as i64
}
