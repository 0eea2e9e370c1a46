// Consensus-critical. Changes require spec update + tests.
//! Proof-of-audit block validation.
//!
//! A PoA block audits a contiguous run of PoS blocks: it embeds their
//! `(hash, height, time)` summaries, commits to them with a merkle root,
//! and pays a fixed reward per audited block. [`PoaValidator::validate`]
//! runs every check a candidate must pass against the current index and
//! block store. Checks are pure over a consistent `(index, store)`
//! snapshot; callers hold the index lock for the duration of a call.
//!
//! Historical faults on the live chain are compensated through the
//! [`AuditExceptions`](crate::exceptions::AuditExceptions) tables; those
//! bypasses are consensus rules in their own right.

use num_bigint::BigUint;
use prism_chain::{BlockStore, ChainIndex, IndexEntry, NodeId};
use prism_core::{audit_merkle_root, Amount, Block, BlockHeader, Hash32, Output};
use tracing::{debug, warn};

use crate::difficulty::decode_compact;
use crate::error::ValidationError;
use crate::params::{ChainParams, Network};

/// Stake-kernel re-verification of an audited PoS block.
///
/// Implemented by the staking subsystem; the validator only consumes the
/// verdict.
pub trait StakeVerifier {
    /// Re-verify the stake kernel of the block at `entry`.
    fn reverify_pos_block(&self, entry: &IndexEntry) -> bool;
}

/// Verification of the zero-blinding commitment on a reward output.
pub trait CommitmentVerifier {
    /// Check that `output.commitment` commits to `output.value` with a
    /// zero blinding factor.
    fn verify_zero_blind_commitment(&self, output: &Output) -> bool;
}

/// Validates candidate PoA blocks against the index and block store.
pub struct PoaValidator<'a, S, K, C> {
    params: &'a ChainParams,
    index: &'a ChainIndex,
    store: &'a S,
    stake: &'a K,
    commitments: &'a C,
}

impl<'a, S, K, C> PoaValidator<'a, S, K, C>
where
    S: BlockStore,
    K: StakeVerifier,
    C: CommitmentVerifier,
{
    /// Build a validator over a consistent index/store snapshot.
    pub fn new(
        params: &'a ChainParams,
        index: &'a ChainIndex,
        store: &'a S,
        stake: &'a K,
        commitments: &'a C,
    ) -> Self {
        Self {
            params,
            index,
            store,
            stake,
            commitments,
        }
    }

    /// Run every PoA check. Rejection is terminal; the first failing
    /// check is reported.
    pub fn validate(&self, block: &Block) -> Result<(), ValidationError> {
        let tip = self.tip_of(&block.header)?;

        self.check_mined_hash(&block.header)?;
        self.check_prev_poa_hash(&block.header)?;
        self.check_audit_merkle_root(block)?;
        self.check_audit_count(block, tip)?;
        self.check_contains_recent_hash(block)?;
        self.check_no_poa_in_audited(block, tip)?;
        self.check_block_time(block)?;
        self.check_no_auditing_overlap(block)?;
        self.check_reward_amount(block, tip)?;
        self.check_padding(block, tip)?;

        debug!(target: "poa", audited = block.audited.len(), "PoA block validated");
        Ok(())
    }

    /// Index entry of the candidate's parent.
    fn tip_of(&self, header: &BlockHeader) -> Result<NodeId, ValidationError> {
        self.index
            .by_hash(&header.prev)
            .ok_or(ValidationError::MissingAncestor { hash: header.prev })
    }

    /// The mined hash must satisfy the target decoded from `bits`.
    ///
    /// There is no PoA miner yet; emulated PoA blocks bypass the check on
    /// testnet and wherever `skip_pow_check` is set. The stored hash is
    /// trusted as-is.
    pub fn check_mined_hash(&self, header: &BlockHeader) -> Result<(), ValidationError> {
        if self.params.skip_pow_check || self.params.network == Network::Testnet {
            return Ok(());
        }

        let target = decode_compact(header.bits);
        if target.is_invalid() {
            return Err(ValidationError::BitsOutOfRange);
        }

        let mined = BigUint::from_bytes_be(header.mined_hash.as_bytes());
        if mined > target.value {
            warn!(target: "poa", mined_hash = %header.mined_hash, bits = header.bits,
                  "mined hash does not satisfy PoA target");
            return Err(ValidationError::MinedHashAboveTarget {
                mined_hash: header.mined_hash,
                bits: header.bits,
            });
        }
        Ok(())
    }

    /// `prev_poa` must name the nearest PoA ancestor, or be null when no
    /// PoA ancestor exists.
    pub fn check_prev_poa_hash(&self, header: &BlockHeader) -> Result<(), ValidationError> {
        let tip = self.tip_of(header)?;

        let mut cursor = tip;
        while self.index.entry(cursor).height > self.params.start_poa_block {
            let entry = self.index.entry(cursor);
            if entry.kind.is_poa() {
                break;
            }
            match entry.prev {
                Some(p) => cursor = p,
                None => return Err(ValidationError::MissingAncestor { hash: entry.hash }),
            }
        }

        let entry = self.index.entry(cursor);
        let expected = if entry.height > self.params.start_poa_block {
            entry.hash
        } else {
            Hash32::zero()
        };
        if header.prev_poa != expected {
            return Err(ValidationError::PrevPoaMismatch {
                expected,
                found: header.prev_poa,
            });
        }
        Ok(())
    }

    /// The header's audit merkle root must match the recomputed tree.
    pub fn check_audit_merkle_root(&self, block: &Block) -> Result<(), ValidationError> {
        let (expected, mutated) = audit_merkle_root(&block.audited);
        if mutated {
            warn!(target: "poa", root = %expected, "mutated audit merkle tree");
        }
        if expected != block.header.audit_root {
            return Err(ValidationError::MerkleMismatch {
                expected,
                found: block.header.audit_root,
            });
        }
        Ok(())
    }

    /// The audit set size must stay within the configured bounds.
    ///
    /// The configured maximum only binds past `poa_padding_height`; the
    /// historical cap of 120 applies before.
    pub fn check_audit_count(&self, block: &Block, tip: NodeId) -> Result<(), ValidationError> {
        let tip_height = self.index.entry(tip).height;
        let min = self.params.min_pos_blocks_audited;
        let max = self.params.max_audited_at(tip_height);
        let count = block.audited.len();
        if count < min || count > max {
            return Err(ValidationError::CountOutOfRange { count, min, max });
        }
        Ok(())
    }

    /// Audit-continuity: the audit set must pick up exactly where the
    /// previous PoA block left off and re-verify, subject to the forensic
    /// exception tables.
    pub fn check_contains_recent_hash(&self, block: &Block) -> Result<(), ValidationError> {
        let tip = self.tip_of(&block.header)?;

        // Nearest PoA ancestor of the parent.
        let mut cursor = tip;
        while self.index.entry(cursor).height >= self.params.start_poa_block {
            let entry = self.index.entry(cursor);
            if entry.kind.is_poa() {
                break;
            }
            match entry.prev {
                Some(p) => cursor = p,
                None => break,
            }
        }
        let prev_poa = self.index.entry(cursor);

        if prev_poa.height <= self.params.start_poa_block {
            return self.check_first_audit_window(block);
        }

        if self
            .params
            .exceptions
            .bypasses_recent_hash_check(prev_poa.height)
        {
            debug!(target: "poa", height = prev_poa.height, "recent-hash check bypassed");
            return Ok(());
        }

        let prev_poa_block = self.store.read(prev_poa)?;
        let last_summary =
            prev_poa_block
                .audited
                .last()
                .copied()
                .ok_or(ValidationError::EmptyAuditSet {
                    hash: prev_poa.hash,
                })?;

        if !self.index.contains(&last_summary.hash)
            && !self.params.exceptions.is_wrong_audit(&last_summary.hash)
        {
            return Err(ValidationError::MissingAncestor {
                hash: last_summary.hash,
            });
        }

        for summary in &block.audited {
            if !self.index.contains(&summary.hash) {
                return Err(ValidationError::MissingAncestor { hash: summary.hash });
            }
        }

        let first = match block.audited.first() {
            Some(summary) => *summary,
            None => {
                return Err(ValidationError::EmptyAuditSet {
                    hash: block.header.prev,
                })
            }
        };
        let first_id = self
            .index
            .by_hash(&first.hash)
            .ok_or(ValidationError::MissingAncestor { hash: first.hash })?;

        // The previous audit window must end on the same fork this one
        // starts on.
        let fork_point = self
            .index
            .ancestor(first_id, last_summary.height)
            .ok_or(ValidationError::MissingAncestor {
                hash: last_summary.hash,
            })?;
        let fork_point_hash = self.index.entry(fork_point).hash;
        if fork_point_hash != last_summary.hash
            && !self.params.exceptions.is_fixed_audit(&fork_point_hash)
        {
            return Err(ValidationError::AuditNonContiguous {
                expected: last_summary.hash,
                found: fork_point_hash,
            });
        }

        // No PoS block may sit between the previous window and this one.
        match self.index.prev_pos_block(first_id) {
            None => {
                return Err(ValidationError::MissingAncestor { hash: first.hash });
            }
            Some(p) => {
                let walked = self.index.entry(p).hash;
                if walked != last_summary.hash
                    && !self.params.exceptions.is_fixed_audit(&fork_point_hash)
                {
                    return Err(ValidationError::AuditNonContiguous {
                        expected: last_summary.hash,
                        found: walked,
                    });
                }
            }
        }

        // Entries must be consecutive PoS blocks, newest to oldest.
        for i in (1..block.audited.len()).rev() {
            let this = block.audited[i];
            let this_id = self
                .index
                .by_hash(&this.hash)
                .ok_or(ValidationError::MissingAncestor { hash: this.hash })?;
            let prev_pos = self
                .index
                .prev_pos_block(this_id)
                .ok_or(ValidationError::MissingAncestor { hash: this.hash })?;
            let prev_entry = self.index.entry(prev_pos);
            let expected = block.audited[i - 1];

            if prev_entry.hash != expected.hash {
                return Err(ValidationError::AuditNonContiguous {
                    expected: expected.hash,
                    found: prev_entry.hash,
                });
            }
            if prev_entry.height != expected.height || prev_entry.time != expected.time {
                return Err(ValidationError::AuditMismatch {
                    hash: expected.hash,
                });
            }

            let this_entry = self.index.entry(this_id);
            if !self.stake.reverify_pos_block(this_entry) && expected.time != 0 {
                warn!(target: "poa", hash = %this.hash, "stake re-verification failed");
                return Err(ValidationError::StakeReverifyFailed { hash: this.hash });
            }
        }

        let first_entry = self.index.entry(first_id);
        if !self.stake.reverify_pos_block(first_entry) && first.time != 0 {
            warn!(target: "poa", hash = %first.hash, "stake re-verification failed");
            return Err(ValidationError::StakeReverifyFailed { hash: first.hash });
        }

        Ok(())
    }

    /// First-PoA case: the window must cover the PoS blocks immediately
    /// after the PoW cutoff.
    fn check_first_audit_window(&self, block: &Block) -> Result<(), ValidationError> {
        for (i, summary) in block.audited.iter().enumerate() {
            let expected_height = self.params.last_pow_block + 1 + i as u32;
            let id = self
                .index
                .by_hash(&summary.hash)
                .ok_or(ValidationError::MissingAncestor { hash: summary.hash })?;
            let entry = self.index.entry(id);
            if summary.height != expected_height
                || entry.height != summary.height
                || entry.time != summary.time
            {
                return Err(ValidationError::AuditMismatch { hash: summary.hash });
            }
            if !self.stake.reverify_pos_block(entry) && summary.time != 0 {
                warn!(target: "poa", hash = %summary.hash, "stake re-verification failed");
                return Err(ValidationError::StakeReverifyFailed { hash: summary.hash });
            }
        }
        Ok(())
    }

    /// No audited entry may refer to a PoA block.
    pub fn check_no_poa_in_audited(&self, block: &Block, tip: NodeId) -> Result<(), ValidationError> {
        let tip_height = self.index.entry(tip).height;
        if self.params.exceptions.bypasses_audited_poa_check(tip_height) {
            debug!(target: "poa", height = tip_height, "audited-PoA check bypassed");
            return Ok(());
        }
        for summary in &block.audited {
            let id = self
                .index
                .by_hash(&summary.hash)
                .ok_or(ValidationError::MissingAncestor { hash: summary.hash })?;
            if self.index.entry(id).kind.is_poa() {
                return Err(ValidationError::AuditContainsPoA { hash: summary.hash });
            }
        }
        Ok(())
    }

    /// PoA block times strictly increase, with the configured minimum gap.
    pub fn check_block_time(&self, block: &Block) -> Result<(), ValidationError> {
        if block.header.prev_poa.is_zero() {
            return Ok(());
        }
        let prev_id = self.index.by_hash(&block.header.prev_poa).ok_or(
            ValidationError::MissingAncestor {
                hash: block.header.prev_poa,
            },
        )?;
        let prev_time = self.index.entry(prev_id).time;
        let current = block.header.time;
        if current <= prev_time || current - prev_time < self.params.poa_block_time {
            return Err(ValidationError::BlockTimeTooClose {
                prev: prev_time,
                current,
            });
        }
        Ok(())
    }

    /// No audited entry may repeat an entry of the predecessor's audit
    /// set.
    pub fn check_no_auditing_overlap(&self, block: &Block) -> Result<(), ValidationError> {
        if block.header.prev_poa.is_zero() {
            return Ok(());
        }
        let prev_id = self.index.by_hash(&block.header.prev_poa).ok_or(
            ValidationError::MissingAncestor {
                hash: block.header.prev_poa,
            },
        )?;
        let prev_block = self.store.read(self.index.entry(prev_id))?;
        for summary in &block.audited {
            if prev_block.audited.contains(summary) {
                return Err(ValidationError::AuditOverlap { hash: summary.hash });
            }
        }
        Ok(())
    }

    /// Exactly one coinbase with one output paying
    /// `|audited| * reward_per_audit`, carrying a valid zero-blind
    /// commitment.
    pub fn check_reward_amount(&self, block: &Block, tip: NodeId) -> Result<(), ValidationError> {
        let tip_height = self.index.entry(tip).height;
        let reward = self.params.poa_reward_per_audit(tip_height);
        let expected = reward
            .checked_mul(block.audited.len() as u64)
            .map_err(|_| ValidationError::RewardMismatch {
                expected: reward,
                found: Amount::zero(),
            })?;

        let output = match (&block.txs[..], block.txs.first().map(|tx| &tx.outputs[..])) {
            ([_], Some([output])) => output,
            _ => {
                return Err(ValidationError::RewardMismatch {
                    expected,
                    found: Amount::zero(),
                })
            }
        };

        if output.value != expected {
            return Err(ValidationError::RewardMismatch {
                expected,
                found: output.value,
            });
        }
        if !self.commitments.verify_zero_blind_commitment(output) {
            return Err(ValidationError::CommitmentInvalid);
        }
        Ok(())
    }

    /// Past the hard fork, the block must trail its last audited PoS
    /// block by at least `poa_padding` heights.
    pub fn check_padding(&self, block: &Block, tip: NodeId) -> Result<(), ValidationError> {
        let tip_height = self.index.entry(tip).height;
        if tip_height < self.params.hard_fork_height {
            return Ok(());
        }
        let last_pos_height = block.audited.last().map(|s| s.height).unwrap_or(0);
        let padding = tip_height as i64 - last_pos_height as i64;
        if padding < self.params.poa_padding as i64 {
            debug!(target: "poa", tip_height, last_pos_height, padding, "audit padding too small");
            return Err(ValidationError::PaddingTooSmall {
                padding,
                required: self.params.poa_padding,
            });
        }
        Ok(())
    }
}
