//! End-to-end PoA validation scenarios over an in-memory index and store.

use std::collections::{HashMap, HashSet};

use prism_chain::{BlockStore, ChainIndex, IndexEntry, NodeId, StoreError};
use prism_consensus::{
    next_work_required, AuditExceptions, ChainParams, CommitmentVerifier, Network, PoaValidator,
    StakeVerifier, ValidationError,
};
use prism_core::{
    audit_merkle_root, Amount, Block, BlockHeader, BlockKind, Commitment, Hash32, Output,
    PoSBlockSummary, Transaction, TransactionKind, PROTOCOL_VERSION,
};

// ---------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------

#[derive(Default)]
struct MemStore {
    blocks: HashMap<Hash32, Block>,
}

impl MemStore {
    fn put(&mut self, hash: Hash32, block: Block) {
        self.blocks.insert(hash, block);
    }
}

impl BlockStore for MemStore {
    fn read(&self, entry: &IndexEntry) -> Result<Block, StoreError> {
        self.blocks
            .get(&entry.hash)
            .cloned()
            .ok_or(StoreError::MissingBlock(entry.hash))
    }
}

struct AcceptStake;

impl StakeVerifier for AcceptStake {
    fn reverify_pos_block(&self, _entry: &IndexEntry) -> bool {
        true
    }
}

/// Rejects the configured hashes, accepts everything else.
struct RejectStake {
    rejected: HashSet<Hash32>,
}

impl StakeVerifier for RejectStake {
    fn reverify_pos_block(&self, entry: &IndexEntry) -> bool {
        !self.rejected.contains(&entry.hash)
    }
}

struct AcceptCommitments;

impl CommitmentVerifier for AcceptCommitments {
    fn verify_zero_blind_commitment(&self, _output: &Output) -> bool {
        true
    }
}

struct RejectCommitments;

impl CommitmentVerifier for RejectCommitments {
    fn verify_zero_blind_commitment(&self, _output: &Output) -> bool {
        false
    }
}

struct Harness {
    params: ChainParams,
    index: ChainIndex,
    store: MemStore,
    tip: Option<NodeId>,
    next_hash: u32,
}

fn h(n: u32) -> Hash32 {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&n.to_be_bytes());
    bytes[31] = 0xaa;
    Hash32(bytes)
}

fn time_at(height: u32) -> u64 {
    1_600_000_000 + height as u64 * 60
}

impl Harness {
    /// Testnet parameters: the mined-hash check is bypassed, exception
    /// tables are empty, audit bounds are 2..=120.
    fn new() -> Self {
        Self::with_params((*ChainParams::for_network(Network::Testnet)).clone())
    }

    fn with_params(params: ChainParams) -> Self {
        Self {
            params,
            index: ChainIndex::new(),
            store: MemStore::default(),
            tip: None,
            next_hash: 1,
        }
    }

    fn fresh_hash(&mut self) -> Hash32 {
        let hash = h(self.next_hash);
        self.next_hash += 1;
        hash
    }

    /// Append one block on the current tip.
    fn push(&mut self, kind: BlockKind, time: u64) -> NodeId {
        let hash = self.fresh_hash();
        self.push_at(hash, self.tip, kind, time)
    }

    fn push_at(
        &mut self,
        hash: Hash32,
        prev: Option<NodeId>,
        kind: BlockKind,
        time: u64,
    ) -> NodeId {
        let id = self
            .index
            .push(hash, prev, time, 0x1e00_ffff, kind)
            .unwrap();
        self.tip = Some(id);
        id
    }

    /// PoW blocks through `last_pow_block`, then PoS blocks up to
    /// `height`.
    fn grow_to(&mut self, height: u32) {
        let start = self.tip.map(|t| self.index.entry(t).height + 1).unwrap_or(0);
        for hgt in start..=height {
            let kind = if hgt <= self.params.last_pow_block {
                BlockKind::PoW
            } else {
                BlockKind::PoS
            };
            self.push(kind, time_at(hgt));
        }
    }

    fn id_at(&self, height: u32) -> NodeId {
        self.index
            .ancestor(self.tip.unwrap(), height)
            .expect("height on active chain")
    }

    fn summary_at(&self, height: u32) -> PoSBlockSummary {
        let entry = self.index.entry(self.id_at(height));
        PoSBlockSummary {
            hash: entry.hash,
            height: entry.height,
            time: entry.time,
        }
    }

    fn summaries(&self, heights: impl IntoIterator<Item = u32>) -> Vec<PoSBlockSummary> {
        heights.into_iter().map(|hgt| self.summary_at(hgt)).collect()
    }

    /// Assemble a well-formed PoA candidate on the current tip.
    fn poa_candidate(&self, audited: Vec<PoSBlockSummary>, time: u64) -> Block {
        let tip_id = self.tip.unwrap();
        let tip = self.index.entry(tip_id);
        let prev_poa = self.prev_poa_of(tip_id);
        let (audit_root, _) = audit_merkle_root(&audited);
        let reward = self.params.poa_reward_per_audit(tip.height);
        let value = reward.checked_mul(audited.len() as u64).unwrap();
        Block {
            header: BlockHeader {
                version: PROTOCOL_VERSION,
                kind: BlockKind::PoA,
                prev: tip.hash,
                prev_poa,
                audit_root,
                time,
                bits: next_work_required(&self.params, &self.index, tip_id, BlockKind::PoA),
                nonce: 0,
                mined_hash: Hash32::zero(),
            },
            txs: vec![Transaction {
                version: PROTOCOL_VERSION,
                kind: TransactionKind::Coinbase,
                outputs: vec![Output {
                    value,
                    commitment: Commitment::zero(),
                }],
            }],
            audited,
        }
    }

    fn prev_poa_of(&self, from: NodeId) -> Hash32 {
        let mut cursor = from;
        while self.index.entry(cursor).height > self.params.start_poa_block {
            let entry = self.index.entry(cursor);
            if entry.kind.is_poa() {
                return entry.hash;
            }
            match entry.prev {
                Some(p) => cursor = p,
                None => break,
            }
        }
        Hash32::zero()
    }

    /// Connect a validated PoA candidate: index it and store its body.
    fn connect_poa(&mut self, block: &Block) -> NodeId {
        let hash = prism_core::block_header_hash(&block.header).unwrap();
        let id = self.index.push_header(hash, &block.header).unwrap();
        self.store.put(hash, block.clone());
        self.tip = Some(id);
        id
    }

    fn validate(&self, block: &Block) -> Result<(), ValidationError> {
        PoaValidator::new(
            &self.params,
            &self.index,
            &self.store,
            &AcceptStake,
            &AcceptCommitments,
        )
        .validate(block)
    }
}

/// Harness with a first PoA block already connected: window
/// `201..=210`, PoS chain regrown to `height`.
fn harness_with_first_poa(height: u32) -> (Harness, Block) {
    let mut harness = Harness::new();
    harness.grow_to(240);
    let first = harness.poa_candidate(harness.summaries(201..=210), time_at(241));
    harness.validate(&first).unwrap();
    harness.connect_poa(&first);
    harness.grow_to(height);
    (harness, first)
}

// ---------------------------------------------------------------------
// First PoA block
// ---------------------------------------------------------------------

#[test]
fn first_poa_block_accepted() {
    let mut harness = Harness::new();
    harness.grow_to(240);
    let block = harness.poa_candidate(harness.summaries(201..=210), time_at(241));
    harness.validate(&block).unwrap();
}

#[test]
fn first_poa_window_must_start_after_pow_cutoff() {
    let mut harness = Harness::new();
    harness.grow_to(240);
    let block = harness.poa_candidate(harness.summaries(202..=211), time_at(241));
    assert!(matches!(
        harness.validate(&block),
        Err(ValidationError::AuditMismatch { .. })
    ));
}

#[test]
fn failed_reverification_rejected_in_first_window() {
    let mut harness = Harness::new();
    harness.grow_to(240);
    let block = harness.poa_candidate(harness.summaries(201..=210), time_at(241));

    let rejected: HashSet<Hash32> = [block.audited[3].hash].into_iter().collect();
    let stake = RejectStake { rejected };
    let validator = PoaValidator::new(
        &harness.params,
        &harness.index,
        &harness.store,
        &stake,
        &AcceptCommitments,
    );
    assert!(matches!(
        validator.validate(&block),
        Err(ValidationError::StakeReverifyFailed { .. })
    ));
}

// ---------------------------------------------------------------------
// Subsequent PoA blocks
// ---------------------------------------------------------------------

#[test]
fn second_poa_block_accepted() {
    let (mut harness, _) = harness_with_first_poa(260);
    let block = harness.poa_candidate(harness.summaries(211..=220), time_at(262));
    harness.validate(&block).unwrap();
    harness.connect_poa(&block);

    // And a third, continuing the window.
    harness.grow_to(280);
    let third = harness.poa_candidate(harness.summaries(221..=230), time_at(282));
    harness.validate(&third).unwrap();
}

#[test]
fn audit_window_gap_rejected() {
    let (harness, _) = harness_with_first_poa(260);
    // Skips PoS block 211.
    let block = harness.poa_candidate(harness.summaries(212..=220), time_at(262));
    assert!(matches!(
        harness.validate(&block),
        Err(ValidationError::AuditNonContiguous { .. })
    ));
}

#[test]
fn audit_summary_time_mismatch_rejected() {
    let (harness, _) = harness_with_first_poa(260);
    let mut audited = harness.summaries(211..=220);
    audited[4].time += 1;
    // Rebuild the candidate so the merkle root commits to the tampered
    // set; the index comparison must still catch it.
    let block = harness.poa_candidate(audited, time_at(262));
    assert!(matches!(
        harness.validate(&block),
        Err(ValidationError::AuditMismatch { .. })
    ));
}

#[test]
fn audit_overlap_rejected() {
    let (harness, first) = harness_with_first_poa(260);
    // Re-audits 210, the last entry of the first window.
    let block = harness.poa_candidate(harness.summaries(210..=219), time_at(262));
    let validator = PoaValidator::new(
        &harness.params,
        &harness.index,
        &harness.store,
        &AcceptStake,
        &AcceptCommitments,
    );
    let err = validator.check_no_auditing_overlap(&block).unwrap_err();
    match err {
        ValidationError::AuditOverlap { hash } => {
            assert_eq!(hash, first.audited.last().unwrap().hash);
        }
        other => panic!("expected AuditOverlap, got {other:?}"),
    }
}

#[test]
fn prev_poa_hash_must_name_nearest_poa_ancestor() {
    let (harness, _) = harness_with_first_poa(260);
    let mut block = harness.poa_candidate(harness.summaries(211..=220), time_at(262));
    block.header.prev_poa = Hash32::zero();
    assert!(matches!(
        harness.validate(&block),
        Err(ValidationError::PrevPoaMismatch { .. })
    ));
}

#[test]
fn merkle_root_mismatch_rejected() {
    let (harness, _) = harness_with_first_poa(260);
    let mut block = harness.poa_candidate(harness.summaries(211..=220), time_at(262));
    block.header.audit_root = Hash32([0xee; 32]);
    assert!(matches!(
        harness.validate(&block),
        Err(ValidationError::MerkleMismatch { .. })
    ));
}

#[test]
fn poa_blocks_must_respect_minimum_spacing() {
    let (harness, first) = harness_with_first_poa(260);
    // Testnet poa_block_time is 300 seconds.
    let too_soon = first.header.time + 100;
    let block = harness.poa_candidate(harness.summaries(211..=220), too_soon);
    assert!(matches!(
        harness.validate(&block),
        Err(ValidationError::BlockTimeTooClose { .. })
    ));

    let on_time = first.header.time + 300;
    let block = harness.poa_candidate(harness.summaries(211..=220), on_time);
    harness.validate(&block).unwrap();
}

#[test]
fn audit_count_bounds_enforced() {
    let (harness, _) = harness_with_first_poa(260);
    // Below the testnet minimum of 2.
    let block = harness.poa_candidate(harness.summaries(211..=211), time_at(262));
    assert!(matches!(
        harness.validate(&block),
        Err(ValidationError::CountOutOfRange { count: 1, min: 2, .. })
    ));
}

#[test]
fn audit_count_cap_switches_at_padding_height() {
    let mut params = (*ChainParams::for_network(Network::Testnet)).clone();
    params.poa_padding_height = 250;
    params.max_pos_blocks_audited = 5;
    let mut harness = Harness::with_params(params);
    harness.grow_to(240);

    // Tip 240 <= padding height: the historical cap of 120 applies.
    let wide = harness.poa_candidate(harness.summaries(201..=210), time_at(241));
    harness.validate(&wide).unwrap();

    // Tip past the padding height: the configured maximum binds.
    harness.connect_poa(&wide);
    harness.grow_to(260);
    let block = harness.poa_candidate(harness.summaries(211..=220), time_at(262));
    assert!(matches!(
        harness.validate(&block),
        Err(ValidationError::CountOutOfRange { count: 10, max: 5, .. })
    ));
}

#[test]
fn orphan_sentinel_tolerates_failed_reverification() {
    // The zero-time sentinel only escapes the index tuple comparison for
    // the window's first entry, so a single-entry window exercises it.
    let mut params = (*ChainParams::for_network(Network::Testnet)).clone();
    params.min_pos_blocks_audited = 1;
    let mut harness = Harness::with_params(params);
    harness.grow_to(240);
    let first = harness.poa_candidate(harness.summaries(201..=210), time_at(241));
    harness.validate(&first).unwrap();
    harness.connect_poa(&first);
    harness.grow_to(260);

    let mut summary = harness.summary_at(211);
    let rejected: HashSet<Hash32> = [summary.hash].into_iter().collect();
    summary.time = 0;
    let block = harness.poa_candidate(vec![summary], time_at(262));

    let stake = RejectStake { rejected };
    let validator = PoaValidator::new(
        &harness.params,
        &harness.index,
        &harness.store,
        &stake,
        &AcceptCommitments,
    );
    validator.validate(&block).unwrap();
}

// ---------------------------------------------------------------------
// Audit set content
// ---------------------------------------------------------------------

#[test]
fn audited_poa_block_rejected_and_bypassed() {
    let (mut harness, _first) = harness_with_first_poa(260);
    let second = harness.poa_candidate(harness.summaries(211..=220), time_at(262));
    harness.validate(&second).unwrap();
    let poa_id = harness.connect_poa(&second);
    harness.grow_to(280);

    // An audit set naming the PoA block itself.
    let poa_entry = harness.index.entry(poa_id);
    let mut audited = harness.summaries(221..=229);
    audited.push(PoSBlockSummary {
        hash: poa_entry.hash,
        height: poa_entry.height,
        time: poa_entry.time,
    });
    let block = harness.poa_candidate(audited, time_at(282));

    let validator = PoaValidator::new(
        &harness.params,
        &harness.index,
        &harness.store,
        &AcceptStake,
        &AcceptCommitments,
    );
    match validator.check_no_poa_in_audited(&block, harness.tip.unwrap()) {
        Err(ValidationError::AuditContainsPoA { hash }) => {
            assert_eq!(hash, poa_entry.hash);
        }
        other => panic!("expected AuditContainsPoA, got {other:?}"),
    }

    // The same block passes at a whitelisted height.
    let mut bypassed = harness.params.clone();
    bypassed.exceptions = AuditExceptions {
        audited_poa_bypass: vec![harness.index.entry(harness.tip.unwrap()).height],
        ..AuditExceptions::none()
    };
    let validator = PoaValidator::new(
        &bypassed,
        &harness.index,
        &harness.store,
        &AcceptStake,
        &AcceptCommitments,
    );
    validator
        .check_no_poa_in_audited(&block, harness.tip.unwrap())
        .unwrap();
}

// ---------------------------------------------------------------------
// Reward and padding
// ---------------------------------------------------------------------

#[test]
fn reward_rate_switches_at_hard_fork() {
    // Tip height exactly at the hard fork: 0.25 coin per audited block.
    let mut params = (*ChainParams::for_network(Network::Testnet)).clone();
    params.hard_fork_height = 240;
    let mut harness = Harness::with_params(params);
    harness.grow_to(240);

    let block = harness.poa_candidate(harness.summaries(201..=208), time_at(241));
    assert_eq!(
        block.txs[0].outputs[0].value,
        Amount::from_atoms(8 * 25_000_000)
    );
    harness.validate(&block).unwrap();

    // The pre-fork rate must now be rejected.
    let mut wrong = block.clone();
    wrong.txs[0].outputs[0].value = Amount::from_atoms(8 * 50_000_000);
    match harness.validate(&wrong) {
        Err(ValidationError::RewardMismatch { expected, found }) => {
            assert_eq!(expected, Amount::from_atoms(200_000_000));
            assert_eq!(found, Amount::from_atoms(400_000_000));
        }
        other => panic!("expected RewardMismatch, got {other:?}"),
    }
}

#[test]
fn reward_requires_single_coinbase_output() {
    let (harness, _) = harness_with_first_poa(260);
    let mut block = harness.poa_candidate(harness.summaries(211..=220), time_at(262));
    let out = block.txs[0].outputs[0];
    block.txs[0].outputs.push(out);
    assert!(matches!(
        harness.validate(&block),
        Err(ValidationError::RewardMismatch { .. })
    ));
}

#[test]
fn invalid_commitment_rejected() {
    let (harness, _) = harness_with_first_poa(260);
    let block = harness.poa_candidate(harness.summaries(211..=220), time_at(262));
    let validator = PoaValidator::new(
        &harness.params,
        &harness.index,
        &harness.store,
        &AcceptStake,
        &RejectCommitments,
    );
    assert!(matches!(
        validator.validate(&block),
        Err(ValidationError::CommitmentInvalid)
    ));
}

#[test]
fn padding_enforced_past_hard_fork() {
    let mut params = (*ChainParams::for_network(Network::Testnet)).clone();
    params.hard_fork_height = 240;
    // poa_padding is 5.
    let mut harness = Harness::with_params(params);
    harness.grow_to(240);

    // Window ending at 238 leaves a gap of 2.
    let block = harness.poa_candidate(harness.summaries(201..=238), time_at(241));
    match harness.validate(&block) {
        Err(ValidationError::PaddingTooSmall { padding, required }) => {
            assert_eq!(padding, 2);
            assert_eq!(required, 5);
        }
        other => panic!("expected PaddingTooSmall, got {other:?}"),
    }

    // Gap of exactly poa_padding is accepted.
    let block = harness.poa_candidate(harness.summaries(201..=235), time_at(241));
    harness.validate(&block).unwrap();
}

#[test]
fn padding_not_enforced_before_hard_fork() {
    let mut harness = Harness::new();
    harness.grow_to(240);
    // Gap of zero, legal before the fork.
    let block = harness.poa_candidate(harness.summaries(201..=240), time_at(241));
    harness.validate(&block).unwrap();
}

// ---------------------------------------------------------------------
// Mined hash
// ---------------------------------------------------------------------

#[test]
fn mined_hash_checked_on_mainnet_only() {
    let mainnet = (*ChainParams::for_network(Network::Mainnet)).clone();
    let index = ChainIndex::new();
    let store = MemStore::default();
    let validator = PoaValidator::new(&mainnet, &index, &store, &AcceptStake, &AcceptCommitments);

    let mut header = BlockHeader {
        version: PROTOCOL_VERSION,
        kind: BlockKind::PoA,
        prev: Hash32([1u8; 32]),
        prev_poa: Hash32::zero(),
        audit_root: Hash32::zero(),
        time: time_at(241),
        bits: 0x1e05_0000,
        nonce: 0,
        mined_hash: Hash32([0xff; 32]),
    };
    assert!(matches!(
        validator.check_mined_hash(&header),
        Err(ValidationError::MinedHashAboveTarget { .. })
    ));

    // A sufficiently small mined hash passes.
    header.mined_hash = Hash32::zero();
    validator.check_mined_hash(&header).unwrap();

    // Degenerate bits are rejected before any comparison.
    header.bits = 0x1e80_0001;
    assert!(matches!(
        validator.check_mined_hash(&header),
        Err(ValidationError::BitsOutOfRange)
    ));

    // Testnet bypasses the check entirely.
    let testnet = (*ChainParams::for_network(Network::Testnet)).clone();
    let validator = PoaValidator::new(&testnet, &index, &store, &AcceptStake, &AcceptCommitments);
    header.mined_hash = Hash32([0xff; 32]);
    header.bits = 0x1e05_0000;
    validator.check_mined_hash(&header).unwrap();
}

// ---------------------------------------------------------------------
// Forensic exceptions
// ---------------------------------------------------------------------

/// Fork fixture: the previous PoA block's last audit entry points at an
/// abandoned fork of height 206. Heights 201..=205 are shared; `206a` is
/// the orphan the old PoA audited, the active chain carries `206..=215`
/// and the PoA block at 216.
fn forked_audit_harness(orphan_is_ghost: bool) -> (Harness, Block, Hash32, Hash32) {
    let mut params = (*ChainParams::for_network(Network::Testnet)).clone();
    params.start_poa_block = 202;
    let mut harness = Harness::with_params(params);
    harness.grow_to(215);

    // Orphaned PoS sibling of height 206.
    let orphan_hash = if orphan_is_ghost {
        // Referenced by the old audit but never indexed.
        Hash32([0x77; 32])
    } else {
        let parent = harness.id_at(205);
        let hash = harness.fresh_hash();
        let tip_backup = harness.tip;
        harness.push_at(hash, Some(parent), BlockKind::PoS, time_at(206) + 1);
        harness.tip = tip_backup;
        hash
    };

    // Previous PoA block at height 216 whose window ends on the orphan.
    let mut audited = harness.summaries(201..=205);
    audited.push(PoSBlockSummary {
        hash: orphan_hash,
        height: 206,
        time: time_at(206) + 1,
    });
    let prev_poa = harness.poa_candidate(audited, time_at(216));
    harness.connect_poa(&prev_poa);
    harness.grow_to(230);

    // Candidate window starts on the active fork at 207; the ancestor of
    // 207 at height 206 is the active block, not the orphan.
    let candidate = harness.poa_candidate(harness.summaries(207..=215), time_at(230) + 400);
    let active_206 = harness.index.entry(harness.id_at(206)).hash;
    (harness, candidate, orphan_hash, active_206)
}

#[test]
fn forked_audit_rejected_without_exceptions() {
    let (harness, candidate, _, _) = forked_audit_harness(false);
    assert!(matches!(
        harness.validate(&candidate),
        Err(ValidationError::AuditNonContiguous { .. })
    ));
}

#[test]
fn fixed_audit_exception_accepts_the_forked_window() {
    let (mut harness, candidate, _, active_206) = forked_audit_harness(false);
    harness.params.exceptions.fixed_audit = vec![active_206];
    harness.validate(&candidate).unwrap();
}

#[test]
fn wrong_audit_exception_tolerates_ghost_references() {
    let (mut harness, candidate, orphan_hash, active_206) = forked_audit_harness(true);

    // The ghost reference alone is a missing ancestor.
    match harness.validate(&candidate) {
        Err(ValidationError::MissingAncestor { hash }) => assert_eq!(hash, orphan_hash),
        other => panic!("expected MissingAncestor, got {other:?}"),
    }

    // Whitelisting the ghost still leaves the fork-point mismatch.
    harness.params.exceptions.wrong_audit = vec![orphan_hash];
    assert!(matches!(
        harness.validate(&candidate),
        Err(ValidationError::AuditNonContiguous { .. })
    ));

    // Both tables together accept the historical block.
    harness.params.exceptions.fixed_audit = vec![active_206];
    harness.validate(&candidate).unwrap();
}

#[test]
fn recent_hash_bypass_height_skips_the_continuity_check() {
    let (mut harness, _, _, _) = forked_audit_harness(false);
    // Bypass keyed on the previous PoA block's height (216): even a
    // window starting far ahead of the previous one passes.
    harness.params.exceptions.recent_hash_bypass = vec![216];
    let skipping = harness.poa_candidate(harness.summaries(210..=215), time_at(230) + 400);
    let validator = PoaValidator::new(
        &harness.params,
        &harness.index,
        &harness.store,
        &AcceptStake,
        &AcceptCommitments,
    );
    validator.check_contains_recent_hash(&skipping).unwrap();
}

// ---------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------

#[test]
fn missing_predecessor_body_is_a_store_error() {
    let (mut harness, first) = harness_with_first_poa(260);
    let hash = prism_core::block_header_hash(&first.header).unwrap();
    harness.store.blocks.remove(&hash);
    let block = harness.poa_candidate(harness.summaries(211..=220), time_at(262));
    assert!(matches!(
        harness.validate(&block),
        Err(ValidationError::StoreIo(StoreError::MissingBlock(_)))
    ));
}
