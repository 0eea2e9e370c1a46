// Consensus-critical. Changes require spec update + tests.
//! Proof-of-work validation.
//!
//! PoW blocks (heights at/below `last_pow_block`) must carry a hash no
//! greater than the target decoded from `bits`, and `bits` itself must
//! stay within the network's work limit.

use crate::difficulty::{decode_compact, hash_meets_target};
use crate::error::ValidationError;
use crate::params::ChainParams;
use prism_core::Hash32;

/// Validate a proof-of-work hash against its claimed compact target.
pub fn check_proof_of_work(
    hash: &Hash32,
    bits: u32,
    params: &ChainParams,
) -> Result<(), ValidationError> {
    if params.skip_pow_check {
        return Ok(());
    }

    let target = decode_compact(bits);
    if target.is_invalid() || target.value > params.pow_limit {
        return Err(ValidationError::BitsOutOfRange);
    }

    if !hash_meets_target(hash.as_bytes(), &target.value) {
        return Err(ValidationError::MinedHashAboveTarget {
            mined_hash: *hash,
            bits,
        });
    }

    Ok(())
}
