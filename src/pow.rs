//! Proof-of-work target arithmetic
//!
//! `bits` packs a 256-bit target into four bytes: the high byte is a base-256
//! exponent, the low three bytes a mantissa, `target = mantissa *
//! 256^(exponent - 3)`. A block hash read as a big-endian integer must not
//! exceed the target.

use uint::construct_uint;

use crate::constants::{DIFFICULTY_PERIOD, MAX_TARGET_BITS, TARGET_BLOCK_TIME};
use crate::error::{ChainError, Result as ChainResult};
use crate::types::Hash;

construct_uint! {
    /// 256-bit unsigned integer for target and work arithmetic.
    pub struct U256(4);
}

/// Expand a compact `bits` value into the full 256-bit target.
pub fn expand_target(bits: u32) -> ChainResult<U256> {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x00ff_ffff;

    if exponent > 32 {
        return Err(ChainError::InvalidBlock(format!(
            "compact target exponent {} out of range",
            exponent
        )));
    }

    let mantissa = U256::from(mantissa);
    let target = if exponent <= 3 {
        mantissa >> (8 * (3 - exponent))
    } else {
        mantissa << (8 * (exponent - 3))
    };
    Ok(target)
}

/// Pack a target back into compact form. Inverse of `expand_target` up to
/// mantissa truncation.
pub fn compact_from_target(target: U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3))).low_u64() as u32
    };

    // the mantissa is signed in compact form; shift rather than set the
    // sign bit
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | ((size as u32) << 24)
}

/// Does `hash` satisfy the difficulty encoded in `bits`?
pub fn check_proof_of_work(hash: &Hash, bits: u32) -> ChainResult<bool> {
    let target = expand_target(bits)?;
    Ok(U256::from_big_endian(hash) <= target)
}

/// Expected number of hash attempts the block represents: 2^256 divided by
/// target + 1. Chains compare by summed work, never by length.
pub fn block_work(bits: u32) -> ChainResult<U256> {
    let target = expand_target(bits)?;
    match target.checked_add(U256::one()) {
        Some(divisor) => Ok((!target / divisor) + U256::one()),
        None => Ok(U256::one()),
    }
}

/// Compact target for the block after a completed difficulty period.
///
/// The previous target scales by the ratio of the observed period span to
/// the expected one, with the span clamped to a factor of four in either
/// direction, and the result capped at the maximum target.
pub fn next_bits(prev_bits: u32, first_timestamp: u32, last_timestamp: u32) -> ChainResult<u32> {
    let prev_target = expand_target(prev_bits)?;
    let max_target = expand_target(MAX_TARGET_BITS)?;

    let expected_span = (DIFFICULTY_PERIOD as u64) * (TARGET_BLOCK_TIME as u64);
    let actual_span = (last_timestamp.saturating_sub(first_timestamp) as u64)
        .clamp(expected_span / 4, expected_span * 4);

    // multiply first for exactness; a near-maximum target overflows that
    // path and lands on the cap anyway
    let next_target = prev_target
        .checked_mul(U256::from(actual_span))
        .map(|scaled| scaled / U256::from(expected_span))
        .unwrap_or(max_target);

    Ok(compact_from_target(next_target.min(max_target)))
}
