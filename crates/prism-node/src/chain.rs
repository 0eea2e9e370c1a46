//! Chain state: index + store + tip selection.
//!
//! `ChainState` owns the in-memory [`ChainIndex`] and the sled-backed
//! [`ChainDb`], and connects candidate blocks: difficulty check, kind-
//! specific validation (PoW hash or full PoA validation), cumulative-work
//! tip selection, and the reorg-depth guard. Consensus-critical
//! validation is delegated to `prism-consensus`; this module only wires
//! storage and tip bookkeeping around it.

use std::sync::Arc;

use num_bigint::BigUint;
use prism_chain::{BlockStore, ChainDb, ChainError, ChainIndex, IndexRecord, NodeId, StoreError};
use prism_consensus::{
    block_proof, check_proof_of_work, next_work_required, tip_is_better, ChainParams,
    CommitmentVerifier, PoaValidator, StakeVerifier, Tunables, ValidationError,
};
use prism_core::{block_header_hash, Block, BlockKind, CoreError, Hash32};
use tracing::{info, warn};

/// Node-level errors around block connection.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Core type or serialization failure.
    #[error("core: {0}")]
    Core(#[from] CoreError),

    /// Index mutation failure.
    #[error("index: {0}")]
    Chain(#[from] ChainError),

    /// Storage failure.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Consensus rule violation.
    #[error("consensus: {0}")]
    Consensus(#[from] ValidationError),

    /// Header bits disagree with the retarget engine.
    #[error("wrong bits: expected {expected:#010x}, found {found:#010x}")]
    WrongBits {
        /// Required compact target.
        expected: u32,
        /// Target carried by the header.
        found: u32,
    },

    /// The block would reorganize deeper than the configured limit.
    #[error("reorg depth {depth} exceeds limit {max}")]
    ReorgTooDeep {
        /// Depth of the attempted reorganization.
        depth: u32,
        /// Current limit.
        max: u32,
    },

    /// The stored chain is unusable (no genesis, mismatched genesis).
    #[error("corrupt chain state: {0}")]
    Corrupt(&'static str),
}

/// Block index, store, and active tip for one chain.
pub struct ChainState<K, C> {
    params: Arc<ChainParams>,
    tunables: Arc<Tunables>,
    index: ChainIndex,
    db: ChainDb,
    /// Cumulative work parallel to the index arena.
    work: Vec<BigUint>,
    tip: NodeId,
    stake: K,
    commitments: C,
}

impl<K, C> ChainState<K, C>
where
    K: StakeVerifier,
    C: CommitmentVerifier,
{
    /// Load the chain from `db`, inserting `genesis` on first run.
    pub fn load_or_init(
        db: ChainDb,
        genesis: Block,
        params: Arc<ChainParams>,
        tunables: Arc<Tunables>,
        stake: K,
        commitments: C,
    ) -> Result<Self, NodeError> {
        let genesis_hash = block_header_hash(&genesis.header)?;

        if db.all_indices()?.is_empty() {
            let record = IndexRecord {
                height: 0,
                time: genesis.header.time,
                bits: genesis.header.bits,
                kind: genesis.header.kind,
                prev: Hash32::zero(),
                cumulative_work: block_proof(genesis.header.bits).to_bytes_be(),
            };
            db.upsert_block(genesis_hash, &genesis, &record, Some(genesis_hash))?;
        }

        // Rebuild the arena in height order; parents always precede
        // children.
        let mut records = db.all_indices()?;
        records.sort_by_key(|(_, rec)| rec.height);
        match records.first() {
            Some((hash, rec)) if rec.height == 0 && *hash == genesis_hash => {}
            _ => return Err(NodeError::Corrupt("stored genesis does not match")),
        }

        let mut index = ChainIndex::new();
        let mut work = Vec::with_capacity(records.len());
        let mut best: Option<(NodeId, Hash32, BigUint)> = None;

        for (hash, rec) in records {
            let prev = if rec.prev.is_zero() {
                None
            } else {
                Some(
                    index
                        .by_hash(&rec.prev)
                        .ok_or(NodeError::Corrupt("index record before its parent"))?,
                )
            };
            let id = index.push(hash, prev, rec.time, rec.bits, rec.kind)?;
            let cum = BigUint::from_bytes_be(&rec.cumulative_work);
            work.push(cum.clone());

            let better = match &best {
                Some((_, best_hash, best_work)) => tip_is_better(&cum, &hash, best_work, best_hash),
                None => true,
            };
            if better {
                best = Some((id, hash, cum));
            }
        }

        let (tip, tip_hash, _) = best.ok_or(NodeError::Corrupt("no tip after load"))?;
        info!(height = index.entry(tip).height, hash = %tip_hash, "chain loaded");

        Ok(Self {
            params,
            tunables,
            index,
            db,
            work,
            tip,
            stake,
            commitments,
        })
    }

    /// Active tip entry id.
    pub fn tip(&self) -> NodeId {
        self.tip
    }

    /// Height of the active tip.
    pub fn tip_height(&self) -> u32 {
        self.index.entry(self.tip).height
    }

    /// Hash of the active tip.
    pub fn tip_hash(&self) -> Hash32 {
        self.index.entry(self.tip).hash
    }

    /// Read-only view of the index.
    pub fn index(&self) -> &ChainIndex {
        &self.index
    }

    /// Read a block body from the store.
    pub fn read_block(&self, id: NodeId) -> Result<Block, NodeError> {
        Ok(self.db.read(self.index.entry(id))?)
    }

    /// Validate and attach a candidate block, advancing the tip when it
    /// becomes the heaviest.
    pub fn connect_block(&mut self, block: Block) -> Result<Hash32, NodeError> {
        block.validate_sanity()?;
        let hash = block_header_hash(&block.header)?;

        let parent = self
            .index
            .by_hash(&block.header.prev)
            .ok_or(ChainError::UnknownParent(block.header.prev))?;

        let required = next_work_required(&self.params, &self.index, parent, block.header.kind);
        if block.header.bits != required {
            return Err(NodeError::WrongBits {
                expected: required,
                found: block.header.bits,
            });
        }

        match block.header.kind {
            BlockKind::PoW => {
                check_proof_of_work(&hash, block.header.bits, &self.params)
                    .map_err(NodeError::Consensus)?;
            }
            BlockKind::PoS => {
                // Stake-kernel verification happens in the staking
                // subsystem before blocks reach the chain state.
            }
            BlockKind::PoA => {
                PoaValidator::new(
                    &self.params,
                    &self.index,
                    &self.db,
                    &self.stake,
                    &self.commitments,
                )
                .validate(&block)?;
            }
        }

        let cum = &self.work[parent.raw() as usize] + block_proof(block.header.bits);
        let tip_entry = self.index.entry(self.tip);
        let becomes_tip = tip_is_better(&cum, &hash, &self.work[self.tip.raw() as usize], &tip_entry.hash);

        if becomes_tip && parent != self.tip {
            let depth = self.reorg_depth(parent);
            let max = self.tunables.max_reorg_depth();
            if depth > max {
                warn!(depth, max, hash = %hash, "rejecting deep reorganization");
                return Err(NodeError::ReorgTooDeep { depth, max });
            }
        }

        let id = self.index.push_header(hash, &block.header)?;
        let record = IndexRecord {
            height: self.index.entry(id).height,
            time: block.header.time,
            bits: block.header.bits,
            kind: block.header.kind,
            prev: block.header.prev,
            cumulative_work: cum.to_bytes_be(),
        };
        self.db
            .upsert_block(hash, &block, &record, becomes_tip.then_some(hash))?;
        self.work.push(cum);
        if becomes_tip {
            self.tip = id;
            info!(height = self.index.entry(id).height, hash = %hash, "new tip");
        }
        Ok(hash)
    }

    /// Blocks the active chain would lose by reorganizing onto `parent`.
    fn reorg_depth(&self, parent: NodeId) -> u32 {
        let mut a = self.tip;
        let mut b = parent;
        while self.index.entry(a).height > self.index.entry(b).height {
            match self.index.entry(a).prev {
                Some(p) => a = p,
                None => break,
            }
        }
        while self.index.entry(b).height > self.index.entry(a).height {
            match self.index.entry(b).prev {
                Some(p) => b = p,
                None => break,
            }
        }
        while a != b {
            match (self.index.entry(a).prev, self.index.entry(b).prev) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => break,
            }
        }
        self.index.entry(self.tip).height - self.index.entry(a).height
    }
}

/// Deterministic genesis block for `params`.
pub fn build_genesis(params: &ChainParams) -> Block {
    use prism_core::{
        Amount, BlockHeader, Commitment, Output, Transaction, TransactionKind, PROTOCOL_VERSION,
    };
    Block {
        header: BlockHeader {
            version: PROTOCOL_VERSION,
            kind: BlockKind::PoW,
            prev: Hash32::zero(),
            prev_poa: Hash32::zero(),
            audit_root: Hash32::zero(),
            time: 1_602_633_600,
            bits: params.pow_limit_bits,
            nonce: 0,
            mined_hash: Hash32::zero(),
        },
        txs: vec![Transaction {
            version: PROTOCOL_VERSION,
            kind: TransactionKind::Coinbase,
            outputs: vec![Output {
                value: Amount::zero(),
                commitment: Commitment::zero(),
            }],
        }],
        audited: vec![],
    }
}
