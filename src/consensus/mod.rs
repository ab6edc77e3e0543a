//! Consensus
//!
//! - `pos`: stake-weighted slot check and difficulty arithmetic
//! - `staker`: block production loop

pub mod pos;
pub mod staker;
