//! Coin emission schedule
//!
//! The reward halves every `HALVING_INTERVAL` blocks and runs dry after 64
//! halvings. Each block header records the cumulative emission up to and
//! including itself; the chain manager validates the stored figure against
//! the parent's rather than trusting it.

use crate::constants::{HALVING_INTERVAL, INITIAL_REWARD};

/// New coin created by the block at `height`.
pub fn block_reward(height: u32) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_REWARD >> halvings
}

/// Cumulative emission a block at `height` must carry, given its parent's.
/// Fees only move existing coin and never enter this figure.
pub fn expected_cumulative_emission(parent_emission: u64, height: u32) -> u64 {
    parent_emission.saturating_add(block_reward(height))
}

/// Total coin in existence once the chain reaches `height`. Quadratic in the
/// halving count only, so cheap at any height.
pub fn total_emission(height: u32) -> u64 {
    let mut total: u64 = 0;
    let mut h: u64 = 0;
    while h <= height as u64 {
        let halvings = (h / HALVING_INTERVAL as u64) as u32;
        let reward = if halvings >= 64 {
            break;
        } else {
            INITIAL_REWARD >> halvings
        };
        let period_end = ((h / HALVING_INTERVAL as u64) + 1) * HALVING_INTERVAL as u64 - 1;
        let blocks = period_end.min(height as u64) - h + 1;
        total = total.saturating_add(reward.saturating_mul(blocks));
        h = period_end + 1;
    }
    total
}
