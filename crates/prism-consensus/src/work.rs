// Consensus-critical. Changes require spec update + tests.
//! Work calculation helpers (heaviest-chain selection).

use crate::difficulty::decode_compact;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use prism_core::Hash32;

/// Compute per-block proof from compact `bits`.
///
/// Defined as `(~target / (target + 1)) + 1`, which equals
/// `floor(2^256 / (target + 1))`. Negative, overflowing, or zero targets
/// contribute zero proof.
pub fn block_proof(bits: u32) -> BigUint {
    let decoded = decode_compact(bits);
    if decoded.is_invalid() {
        return BigUint::zero();
    }
    let max = (BigUint::one() << 256u32) - BigUint::one();
    ((max - &decoded.value) / (&decoded.value + BigUint::one())) + BigUint::one()
}

/// Return true if tip A is strictly better (heavier) than tip B, tie-breaking on hash.
pub fn tip_is_better(a_work: &BigUint, a_hash: &Hash32, b_work: &BigUint, b_hash: &Hash32) -> bool {
    if a_work != b_work {
        a_work > b_work
    } else {
        a_hash.as_bytes() < b_hash.as_bytes()
    }
}
