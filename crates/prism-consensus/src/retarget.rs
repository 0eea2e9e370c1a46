// Consensus-critical. Changes require spec update + tests.
//! Difficulty retargeting.
//!
//! `next_work_required` selects the target for the block following `prev`:
//!
//! - **PoA** headers get one of three fixed targets keyed off the regime
//!   boundaries (`soft_fork_height`, `poa_new_diff_height`). PoA blocks
//!   are produced by auditors on a fixed cadence, so no feedback loop is
//!   needed.
//! - **PoS** heights use a single-block exponential moving average toward
//!   a 60-second spacing over a 40-block window (ppcoin-style).
//! - **PoW** heights use Dark Gravity Wave v3: a 24-block cumulative
//!   average of targets scaled by the clamped observed timespan.
//!
//! The engine never fails: corrupt inputs (zero divisors, missing
//! ancestors) degrade to the proof-of-work limit.

use num_bigint::BigUint;
use num_traits::Zero;
use prism_chain::{ChainIndex, NodeId};
use prism_core::BlockKind;
use tracing::debug;

use crate::difficulty::{decode_compact, target_to_bits};
use crate::params::ChainParams;

/// PoS retarget spacing in seconds.
const POS_TARGET_SPACING: u64 = 60;
/// PoS retarget window in seconds (40 blocks).
const POS_TARGET_TIMESPAN: u64 = 40 * 60;
/// DGWv3 averaging window in blocks.
const DGW_PAST_BLOCKS: u32 = 24;

/// Compute the required compact target for the block following `prev`.
pub fn next_work_required(
    params: &ChainParams,
    index: &ChainIndex,
    prev: NodeId,
    kind: BlockKind,
) -> u32 {
    let tip = index.entry(prev);

    if params.poa_bits != 0 && kind.is_poa() {
        let bits = if tip.height < params.soft_fork_height {
            params.poa_bits
        } else if tip.height < params.poa_new_diff_height {
            params.poa_bits_soft_fork
        } else {
            params.poa_bits_new_diff
        };
        debug!(target: "retarget", height = tip.height, bits, "fixed PoA target");
        return bits;
    }

    if tip.height == 0 || tip.height < DGW_PAST_BLOCKS {
        return params.pow_limit_bits;
    }

    if tip.height > params.last_pow_block {
        return pos_retarget(params, index, prev);
    }

    dgw_retarget(params, index, prev)
}

/// ppcoin-style per-block exponential retarget toward the PoS spacing.
fn pos_retarget(params: &ChainParams, index: &ChainIndex, prev: NodeId) -> u32 {
    let tip = index.entry(prev);
    let target_limit = BigUint::from_bytes_be(&[0xff; 32]) >> 24u32;

    // Nearest PoS ancestor, stopping at the PoW/PoS boundary.
    let mut cursor = match tip.prev {
        Some(p) => p,
        None => return params.pow_limit_bits,
    };
    while !index.entry(cursor).kind.is_pos() && index.entry(cursor).height > params.last_pow_block {
        match index.entry(cursor).prev {
            Some(p) => cursor = p,
            None => break,
        }
    }
    let last_pos = index.entry(cursor);

    let actual_spacing = tip.time.saturating_sub(last_pos.time).max(1);

    let source_bits = if tip.height < params.soft_fork_height || tip.kind.is_pos() {
        tip.bits
    } else {
        last_pos.bits
    };

    let interval = POS_TARGET_TIMESPAN / POS_TARGET_SPACING;
    let mut new = decode_compact(source_bits).value;
    new *= BigUint::from((interval - 1) * POS_TARGET_SPACING + 2 * actual_spacing);
    new /= BigUint::from((interval + 1) * POS_TARGET_SPACING);

    if new.is_zero() || new > target_limit {
        new = target_limit;
    }

    compact_or_limit(params, &new)
}

/// Dark Gravity Wave v3 (24-block moving average of targets).
fn dgw_retarget(params: &ChainParams, index: &ChainIndex, prev: NodeId) -> u32 {
    let mut count: u64 = 0;
    let mut average = BigUint::zero();
    let mut actual_timespan: i64 = 0;
    let mut last_block_time: i64 = 0;

    let mut reading = Some(prev);
    for _ in 0..DGW_PAST_BLOCKS {
        let id = match reading {
            Some(id) if index.entry(id).height > 0 => id,
            _ => break,
        };
        let entry = index.entry(id);

        count += 1;
        let target = decode_compact(entry.bits).value;
        average = if count == 1 {
            target
        } else {
            (average * count + target) / (count + 1)
        };

        if last_block_time > 0 {
            actual_timespan += last_block_time - entry.time as i64;
        }
        last_block_time = entry.time as i64;

        reading = entry.prev;
    }

    let target_timespan = count as i64 * params.target_spacing as i64;
    if target_timespan == 0 {
        return params.pow_limit_bits;
    }

    let clamped = actual_timespan
        .max(target_timespan / 3)
        .min(target_timespan * 3);

    let mut new = average;
    new *= BigUint::from(clamped as u64);
    new /= BigUint::from(target_timespan as u64);

    if new > params.pow_limit {
        new = params.pow_limit.clone();
    }

    compact_or_limit(params, &new)
}

fn compact_or_limit(params: &ChainParams, target: &BigUint) -> u32 {
    target_to_bits(target).unwrap_or(params.pow_limit_bits)
}
