// TWINS-Core/twins_chain_core/src/blockchain/chain_power.rs
//! Fork-choice metric blending cumulative work and cumulative stake.
//!
//! Two candidates are compared by normalising each component against the
//! larger of the two competing values, with 16 bits of fractional precision:
//!
//! `score(p) = (p.work << 16) / max(work) + (p.stake << 16) / max(stake)`
//!
//! where a zero maximum is replaced by 1. The score only exists relative to
//! the other candidate, so comparisons go through `PartialOrd` on a pair.
//! All arithmetic is 256-bit and wraps/truncates like `arith_uint256`; this is
//! a consensus rule and must not be "fixed" for extreme ratios.

use primitive_types::U256;
use std::cmp::Ordering;

const PRECISION_BITS: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChainPower {
    pub height: u32,
    pub work: U256,
    pub stake: U256,
}

impl ChainPower {
    pub fn new(height: u32, work: U256, stake: U256) -> Self {
        ChainPower { height, work, stake }
    }

    /// Power of a child block: parent accumulators plus this block's
    /// contribution, wrapping at 256 bits.
    pub fn extend(&self, block_work: U256, block_stake: U256) -> Self {
        ChainPower {
            height: self.height + 1,
            work: self.work.overflowing_add(block_work).0,
            stake: self.stake.overflowing_add(block_stake).0,
        }
    }

    /// Normalised scores of `self` and `other`, in that order.
    pub fn scores(&self, other: &ChainPower) -> (U256, U256) {
        let work_divisor = nonzero_max(self.work, other.work);
        let stake_divisor = nonzero_max(self.stake, other.stake);
        let score = |p: &ChainPower| {
            let work_part = (p.work << PRECISION_BITS) / work_divisor;
            let stake_part = (p.stake << PRECISION_BITS) / stake_divisor;
            work_part.overflowing_add(stake_part).0
        };
        (score(self), score(other))
    }
}

fn nonzero_max(a: U256, b: U256) -> U256 {
    let max = if a > b { a } else { b };
    if max.is_zero() {
        U256::one()
    } else {
        max
    }
}

// Equality means equal normalised score, not identical accumulators.
impl PartialEq for ChainPower {
    fn eq(&self, other: &Self) -> bool {
        let (lhs, rhs) = self.scores(other);
        lhs == rhs
    }
}

impl PartialOrd for ChainPower {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let (lhs, rhs) = self.scores(other);
        Some(lhs.cmp(&rhs))
    }
}
