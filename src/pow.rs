//! Proof of work: compact targets, difficulty and retargeting

use crate::constants::*;
use crate::error::{InquisitorError, Result};
use crate::types::Hash;
use primitive_types::U256;

/// Highest allowed target (lowest difficulty): 2^224 - 1
pub fn max_target() -> U256 {
    (U256::one() << 224usize) - U256::one()
}

/// Target of difficulty 1: 0x00000000ffff0000...0000
pub fn difficulty_1_target() -> U256 {
    U256::from(0xffffu64) << 208usize
}

/// ExpandTarget: 𝔹⁴ → ℕ
///
/// The high byte of `bits` is the exponent, the low three bytes the mantissa.
/// Formula: target = mantissa × 2^(8 × (exponent − 3))
///
/// Exponents below 3 shift the mantissa right. The mantissa's 0x00800000 bit
/// is treated as magnitude, not sign.
pub fn bits_to_target(bits: u32) -> Result<U256> {
    let exponent = (bits >> 24) as usize;
    let mantissa = U256::from(bits & 0x00ff_ffff);

    if exponent <= 3 {
        return Ok(mantissa >> (8 * (3 - exponent)));
    }

    let shift = 8 * (exponent - 3);
    if !mantissa.is_zero() && mantissa.bits() + shift > 256 {
        return Err(InquisitorError::TargetOverflow { bits });
    }
    Ok(mantissa << shift)
}

/// CompactTarget: ℕ → 𝔹⁴, inverse of [`bits_to_target`] for targets it produces.
///
/// 1. size = byte length of target
/// 2. mantissa = top three bytes of target
/// 3. If the mantissa's high bit is set, shift it down a byte and grow size
pub fn target_to_bits(target: U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut mantissa = if size <= 3 {
        target.low_u64() << (8 * (3 - size))
    } else {
        (target >> (8 * (size - 3))).low_u64()
    };
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        size += 1;
    }
    (mantissa as u32 & 0x00ff_ffff) | ((size as u32) << 24)
}

/// Interpret a display-order hash as a big-endian 256-bit integer.
pub fn hash_to_u256(hash: &Hash) -> U256 {
    U256::from_big_endian(hash)
}

/// CheckProofOfWork: ℍ × 𝔹⁴ → {true, false}
///
/// Formula: hash < ExpandTarget(bits), strictly. Bits that overflow 256 bits
/// never validate.
pub fn valid_pow(block_hash: &Hash, bits: u32) -> bool {
    match bits_to_target(bits) {
        Ok(target) => hash_to_u256(block_hash) < target,
        Err(_) => false,
    }
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}

/// Difficulty: difficulty_1_target / target. A zero target is infinitely difficult.
pub fn bits_to_difficulty(bits: u32) -> Result<f64> {
    let target = bits_to_target(bits)?;
    if target.is_zero() {
        return Ok(f64::INFINITY);
    }
    Ok(u256_to_f64(difficulty_1_target()) / u256_to_f64(target))
}

/// CalculateNextWorkRequired: 𝔹⁴ × ℕ × ℕ → 𝔹⁴
///
/// 1. timespan = last_time − first_time, clamped to [T/4, 4T] with T = two weeks
/// 2. new_target = old_target × timespan / T
/// 3. new_target = min(new_target, 2^224 − 1)
pub fn next_bits(old_bits: u32, first_time: u32, last_time: u32) -> Result<u32> {
    let min_timespan = TARGET_TIMESPAN / 4;
    let max_timespan = TARGET_TIMESPAN * 4;
    let timespan = (last_time as i64 - first_time as i64)
        .clamp(min_timespan as i64, max_timespan as i64) as u64;

    let old_target = bits_to_target(old_bits)?;
    let new_target = match old_target.checked_mul(U256::from(timespan)) {
        Some(scaled) => (scaled / U256::from(TARGET_TIMESPAN)).min(max_target()),
        None => max_target(),
    };
    Ok(target_to_bits(new_target))
}

/// Bits a block at `height` must carry.
///
/// - Before the first retarget: the initial bits
/// - Inside a period: the previous block's bits
/// - On a period boundary: [`next_bits`] over the closing period, whose first
///   and last block timestamps the caller supplies
pub fn expected_bits(height: u64, previous_bits: u32, period_first_time: u32, period_last_time: u32) -> Result<u32> {
    if height < DIFFICULTY_ADJUSTMENT_INTERVAL {
        return Ok(INITIAL_BITS);
    }
    if height % DIFFICULTY_ADJUSTMENT_INTERVAL != 0 {
        return Ok(previous_bits);
    }
    next_bits(previous_bits, period_first_time, period_last_time)
}
