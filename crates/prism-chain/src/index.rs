// Consensus-critical. Changes require spec update + tests.
//! In-memory block index.
//!
//! The index is an arena: entries live in a `Vec`, back-references are
//! `NodeId`s into it, and a hash map gives O(1) hash lookup. Appending
//! with an existing parent cannot create a cycle, and snapshots are a
//! plain clone. Entries are append-only during normal operation; a reorg
//! removes entries from the active tip backwards, newest first.

use std::collections::HashMap;

use prism_core::{BlockHash, BlockHeader, BlockKind};

use crate::error::ChainError;

/// Identifier of an index entry. Valid only for the index that issued it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    /// Raw arena offset, for diagnostics.
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Header metadata kept in memory for every known block.
#[derive(Clone, Debug)]
pub struct IndexEntry {
    /// Block identity hash.
    pub hash: BlockHash,
    /// Parent entry; `None` only for genesis.
    pub prev: Option<NodeId>,
    /// Height of this block.
    pub height: u32,
    /// Block timestamp (Unix seconds).
    pub time: u64,
    /// Compact difficulty target the block was produced under.
    pub bits: u32,
    /// How the block was produced.
    pub kind: BlockKind,
}

/// Append-only arena of [`IndexEntry`] values with hash lookup.
#[derive(Clone, Debug, Default)]
pub struct ChainIndex {
    entries: Vec<IndexEntry>,
    by_hash: HashMap<BlockHash, NodeId>,
}

impl ChainIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry. The parent must already be present (except for a
    /// genesis entry at height 0), and the hash must be new.
    pub fn push(
        &mut self,
        hash: BlockHash,
        prev: Option<NodeId>,
        time: u64,
        bits: u32,
        kind: BlockKind,
    ) -> Result<NodeId, ChainError> {
        if self.by_hash.contains_key(&hash) {
            return Err(ChainError::DuplicateBlock(hash));
        }
        let height = match prev {
            Some(p) => self.entry(p).height + 1,
            None => 0,
        };
        let id = NodeId(self.entries.len() as u32);
        self.entries.push(IndexEntry {
            hash,
            prev,
            height,
            time,
            bits,
            kind,
        });
        self.by_hash.insert(hash, id);
        Ok(id)
    }

    /// Append an entry derived from a block header.
    pub fn push_header(
        &mut self,
        hash: BlockHash,
        header: &BlockHeader,
    ) -> Result<NodeId, ChainError> {
        let prev = if header.prev.is_zero() {
            None
        } else {
            Some(
                self.by_hash(&header.prev)
                    .ok_or(ChainError::UnknownParent(header.prev))?,
            )
        };
        self.push(hash, prev, header.time, header.bits, header.kind)
    }

    /// Entry for an id issued by this index.
    pub fn entry(&self, id: NodeId) -> &IndexEntry {
        &self.entries[id.0 as usize]
    }

    /// Hash-indexed lookup.
    pub fn by_hash(&self, hash: &BlockHash) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    /// Whether a hash is present.
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Same-chain ancestor of `id` at `height`.
    ///
    /// Returns `None` when `height` exceeds the entry's own height or the
    /// walk runs out of parents before reaching it.
    pub fn ancestor(&self, id: NodeId, height: u32) -> Option<NodeId> {
        let mut cursor = id;
        loop {
            let entry = self.entry(cursor);
            if entry.height == height {
                return Some(cursor);
            }
            if entry.height < height {
                return None;
            }
            cursor = entry.prev?;
        }
    }

    /// Nearest PoS ancestor strictly above the parent link of `id`.
    ///
    /// Walks `prev` pointers until a PoS block is found.
    pub fn prev_pos_block(&self, id: NodeId) -> Option<NodeId> {
        let mut cursor = self.entry(id).prev?;
        loop {
            let entry = self.entry(cursor);
            if entry.kind.is_pos() {
                return Some(cursor);
            }
            cursor = entry.prev?;
        }
    }

    /// Remove the most recently appended entry (reorg step).
    ///
    /// Only the newest entry may be removed so that issued ids stay dense.
    pub fn remove_tip(&mut self, id: NodeId) -> Result<IndexEntry, ChainError> {
        if id.0 as usize != self.entries.len().saturating_sub(1) || self.entries.is_empty() {
            let hash = self
                .entries
                .get(id.0 as usize)
                .map(|e| e.hash)
                .unwrap_or(BlockHash::zero());
            return Err(ChainError::NotTip(hash));
        }
        let entry = self.entries.remove(id.0 as usize);
        self.by_hash.remove(&entry.hash);
        Ok(entry)
    }
}
