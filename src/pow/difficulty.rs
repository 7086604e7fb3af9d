// TWINS-Core/twins_chain_core/src/pow/difficulty.rs
// Compact ("nBits") targets and per-block work. All arithmetic is 256-bit
// fixed width and must wrap exactly like the C++ arith_uint256 it mirrors.

use primitive_types::U256;

use crate::error::ChainError;
use crate::util::Hash256;

/// Decodes compact bits into `(target, negative, overflow)`.
pub fn compact_to_target(bits: u32) -> (U256, bool, bool) {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;
    let target = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from(word)
    } else {
        U256::from(word) << (8 * (size - 3)) as usize
    };
    let negative = word != 0 && (bits & 0x0080_0000) != 0;
    let overflow = word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
    (target, negative, overflow)
}

pub fn target_to_compact(target: U256) -> u32 {
    let mut size = (target.bits() as u32 + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3)) as usize).low_u64() as u32
    };
    // The 0x00800000 bit is the sign; move it into a larger exponent instead.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Expected number of hashes to find a block at `bits`: `2^256 / (target + 1)`,
/// computed as `~target / (target + 1) + 1` to stay within 256 bits.
pub fn block_proof(bits: u32) -> U256 {
    let (target, negative, overflow) = compact_to_target(bits);
    if negative || overflow || target.is_zero() {
        return U256::zero();
    }
    (!target / (target + U256::one())) + U256::one()
}

pub fn check_proof_of_work(hash: &Hash256, bits: u32, pow_limit: U256) -> Result<(), ChainError> {
    let (target, negative, overflow) = compact_to_target(bits);
    if negative || overflow || target.is_zero() || target > pow_limit {
        return Err(ChainError::InvalidTarget { bits });
    }
    if U256::from_little_endian(hash) > target {
        return Err(ChainError::HighHash { hash: *hash, bits });
    }
    Ok(())
}

/// Seconds of block production at `tip_bits` difficulty that the work
/// difference `to_work - from_work` represents. Saturates at `i64::MAX`.
/// Returns 0 when `tip_bits` encodes no work.
pub fn block_proof_equivalent_time(to_work: U256, from_work: U256, tip_bits: u32, target_spacing: u32) -> i64 {
    let (diff, sign) = if to_work > from_work {
        (to_work - from_work, 1i64)
    } else {
        (from_work - to_work, -1i64)
    };
    let tip_proof = block_proof(tip_bits);
    if tip_proof.is_zero() {
        return 0;
    }
    let r = diff.overflowing_mul(U256::from(target_spacing)).0 / tip_proof;
    if r.bits() > 63 {
        return sign * i64::MAX;
    }
    sign * r.low_u64() as i64
}
