// Consensus-critical. Changes require spec update + tests.
//! Merkle tree over the audit set of a PoA block.
//!
//! The tree is the classic pairwise construction: an odd node at any
//! level is paired with itself. Because self-pairing makes two distinct
//! leaf sequences hash to the same root, the builder also reports a
//! mutation flag whenever it combines two identical sibling hashes;
//! callers reject mutated blocks at a higher layer.
//!
//! Leaf encoding is fixed-width and independent of Borsh:
//! `hash(32) || height(4, LE) || time(8, LE)`.

use crate::constants::{DS_AUDIT_LEAF, DS_AUDIT_NODE};
use crate::serialization::hash32;
use crate::types::{Hash32, PoSBlockSummary};

/// Hash a single audit summary into a merkle leaf.
pub fn audit_leaf_hash(summary: &PoSBlockSummary) -> Hash32 {
    let mut bytes = [0u8; 44];
    bytes[..32].copy_from_slice(summary.hash.as_bytes());
    bytes[32..36].copy_from_slice(&summary.height.to_le_bytes());
    bytes[36..].copy_from_slice(&summary.time.to_le_bytes());
    hash32(DS_AUDIT_LEAF, &bytes)
}

/// Compute the merkle root over an ordered audit set.
///
/// Returns `(root, mutated)`. The root of an empty set is the zero hash.
pub fn audit_merkle_root(audited: &[PoSBlockSummary]) -> (Hash32, bool) {
    if audited.is_empty() {
        return (Hash32::zero(), false);
    }

    let mut level: Vec<Hash32> = audited.iter().map(audit_leaf_hash).collect();
    let mut mutated = false;

    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            if pair.len() == 2 && left == right {
                mutated = true;
            }
            next.push(parent_hash(&left, &right));
        }
        level = next;
    }

    (level[0], mutated)
}

fn parent_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(left.as_bytes());
    bytes[32..].copy_from_slice(right.as_bytes());
    hash32(DS_AUDIT_NODE, &bytes)
}
