//! Consensus error types.

use prism_chain::StoreError;
use prism_core::{Amount, Hash32};
use thiserror::Error;

/// Errors returned by consensus validation and difficulty conversion code.
///
/// Every rejection carries the offending hashes/heights so callers can log
/// a rejected block without re-deriving context.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required block (`prev`, `prev_poa`, or an audited hash) is absent
    /// from the index.
    #[error("block {hash} missing from index")]
    MissingAncestor {
        /// The absent hash.
        hash: Hash32,
    },

    /// An audit summary's `(hash, height, time)` tuple disagrees with the
    /// index.
    #[error("audit summary for {hash} does not match the index")]
    AuditMismatch {
        /// Hash of the mismatching summary.
        hash: Hash32,
    },

    /// A PoS block was skipped between consecutive entries of the audit
    /// chain.
    #[error("audit set not contiguous: expected {expected}, found {found}")]
    AuditNonContiguous {
        /// Hash the chain walk was expected to land on.
        expected: Hash32,
        /// Hash it actually landed on.
        found: Hash32,
    },

    /// An audited block was already audited by the predecessor PoA block.
    #[error("block {hash} already audited by the previous PoA block")]
    AuditOverlap {
        /// Hash of the doubly audited block.
        hash: Hash32,
    },

    /// The audit set references a PoA block.
    #[error("audit set contains PoA block {hash}")]
    AuditContainsPoA {
        /// Hash of the referenced PoA block.
        hash: Hash32,
    },

    /// The audit set size is outside the configured bounds.
    #[error("audited {count} blocks, allowed range is {min}..={max}")]
    CountOutOfRange {
        /// Number of audited blocks.
        count: usize,
        /// Inclusive lower bound.
        min: usize,
        /// Inclusive upper bound.
        max: usize,
    },

    /// The gap between the block and its last audited PoS block is too
    /// small.
    #[error("audit padding {padding} below required {required}")]
    PaddingTooSmall {
        /// Observed height gap.
        padding: i64,
        /// Configured minimum gap.
        required: u32,
    },

    /// The PoA block follows its predecessor too closely in time.
    #[error("PoA block time {current} too close to predecessor time {prev}")]
    BlockTimeTooClose {
        /// Predecessor PoA block time.
        prev: u64,
        /// Candidate block time.
        current: u64,
    },

    /// The coinbase output value does not match the audit reward.
    #[error("PoA reward mismatch: expected {expected}, found {found}")]
    RewardMismatch {
        /// Required output value.
        expected: Amount,
        /// Value carried by the block.
        found: Amount,
    },

    /// The zero-blinding commitment on the reward output failed to verify.
    #[error("reward output commitment invalid")]
    CommitmentInvalid,

    /// The mined hash exceeds the target decoded from `bits`.
    #[error("mined hash {mined_hash} above target for bits {bits:#010x}")]
    MinedHashAboveTarget {
        /// The stored mined hash.
        mined_hash: Hash32,
        /// Compact target it failed against.
        bits: u32,
    },

    /// `bits` decoded to a negative, overflowing, or zero target.
    #[error("compact target bits out of range")]
    BitsOutOfRange,

    /// The recomputed audit merkle root disagrees with the header.
    #[error("audit merkle root mismatch: expected {expected}, found {found}")]
    MerkleMismatch {
        /// Recomputed root.
        expected: Hash32,
        /// Root stored in the header.
        found: Hash32,
    },

    /// `prev_poa` disagrees with the nearest PoA ancestor.
    #[error("prev PoA hash mismatch: expected {expected}, found {found}")]
    PrevPoaMismatch {
        /// Hash of the nearest PoA ancestor (zero when none exists).
        expected: Hash32,
        /// Hash carried by the header.
        found: Hash32,
    },

    /// A PoA block carries no audit entries where at least one is
    /// required.
    #[error("empty audit set (context block {hash})")]
    EmptyAuditSet {
        /// Hash identifying the offending block (its own hash for a
        /// stored predecessor, its parent for a candidate).
        hash: Hash32,
    },

    /// A stake-kernel re-verification failed outside the orphan sentinel.
    #[error("stake re-verification failed for audited block {hash}")]
    StakeReverifyFailed {
        /// Hash of the audited block.
        hash: Hash32,
    },

    /// The block store failed while reading a required body.
    #[error("block store: {0}")]
    StoreIo(#[from] StoreError),
}
