//! Persistent block storage.
//!
//! Validators read block bodies through the [`BlockStore`] trait so that
//! consensus code never depends on a concrete backend. The production
//! backend is [`ChainDb`], a sled database holding Borsh-encoded records
//! in three trees: block bodies, index records, and chain metadata.
//! Reads may run concurrently; writes go through sled transactions.

use std::path::Path;

use borsh::{to_vec, BorshDeserialize, BorshSerialize};
use prism_core::{Block, BlockKind, Hash32};
use sled::transaction::{TransactionResult, Transactional};
use sled::Error as SledError;

use crate::error::StoreError;
use crate::index::IndexEntry;

const TREE_BLOCKS: &str = "blocks";
const TREE_INDEX: &str = "index";
const TREE_META: &str = "meta";
const KEY_BEST: &[u8] = b"best";

/// Synchronous read access to full block bodies.
pub trait BlockStore {
    /// Read the block body for an index entry.
    fn read(&self, entry: &IndexEntry) -> Result<Block, StoreError>;
}

/// Durable form of an [`IndexEntry`], keyed by block hash.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct IndexRecord {
    /// Height of the block.
    pub height: u32,
    /// Block timestamp (Unix seconds).
    pub time: u64,
    /// Compact difficulty target.
    pub bits: u32,
    /// How the block was produced.
    pub kind: BlockKind,
    /// Parent block hash (zero for genesis).
    pub prev: Hash32,
    /// Cumulative chain work, big-endian bytes.
    pub cumulative_work: Vec<u8>,
}

/// Sled-backed block and index storage.
pub struct ChainDb {
    db: sled::Db,
    blocks: sled::Tree,
    index: sled::Tree,
    meta: sled::Tree,
}

impl Clone for ChainDb {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            blocks: self.blocks.clone(),
            index: self.index.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl ChainDb {
    /// Open (or create) a database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let blocks = db.open_tree(TREE_BLOCKS)?;
        let index = db.open_tree(TREE_INDEX)?;
        let meta = db.open_tree(TREE_META)?;
        Ok(Self {
            db,
            blocks,
            index,
            meta,
        })
    }

    /// Read a block body by hash.
    pub fn get_block(&self, hash: &Hash32) -> Result<Option<Block>, StoreError> {
        match self.blocks.get(hash.as_bytes())? {
            Some(bytes) => {
                let block = Block::try_from_slice(&bytes)
                    .map_err(|e| StoreError::Codec(e.to_string()))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Whether a block body is stored.
    pub fn has_block(&self, hash: &Hash32) -> Result<bool, StoreError> {
        Ok(self.blocks.contains_key(hash.as_bytes())?)
    }

    /// Read the durable index record for a hash.
    pub fn get_index(&self, hash: &Hash32) -> Result<Option<IndexRecord>, StoreError> {
        match self.index.get(hash.as_bytes())? {
            Some(bytes) => {
                let rec = IndexRecord::try_from_slice(&bytes)
                    .map_err(|e| StoreError::Codec(e.to_string()))?;
                Ok(Some(rec))
            }
            None => Ok(None),
        }
    }

    /// All index records, in unspecified order.
    pub fn all_indices(&self) -> Result<Vec<(Hash32, IndexRecord)>, StoreError> {
        let mut out = Vec::new();
        for item in self.index.iter() {
            let (k, v) = item?;
            if k.len() != 32 {
                return Err(StoreError::Codec("index key is not a hash".into()));
            }
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&k);
            let rec =
                IndexRecord::try_from_slice(&v).map_err(|e| StoreError::Codec(e.to_string()))?;
            out.push((Hash32(hash), rec));
        }
        Ok(out)
    }

    /// Currently recorded best tip, if any.
    pub fn best_tip(&self) -> Result<Option<Hash32>, StoreError> {
        match self.meta.get(KEY_BEST)? {
            Some(bytes) => {
                if bytes.len() != 32 {
                    return Err(StoreError::Codec("best-tip record is not a hash".into()));
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Some(Hash32(arr)))
            }
            None => Ok(None),
        }
    }

    /// Atomically store a block body, its index record, and optionally a
    /// new best tip.
    pub fn upsert_block(
        &self,
        hash: Hash32,
        block: &Block,
        record: &IndexRecord,
        best: Option<Hash32>,
    ) -> Result<(), StoreError> {
        let blk_bytes = to_vec(block).map_err(|e| StoreError::Codec(e.to_string()))?;
        let rec_bytes = to_vec(record).map_err(|e| StoreError::Codec(e.to_string()))?;
        let best_bytes = best.map(|h| h.as_bytes().to_vec());

        let res: TransactionResult<(), SledError> =
            (&self.blocks, &self.index, &self.meta).transaction(|(blocks, index, meta)| {
                blocks.insert(hash.as_bytes(), blk_bytes.clone())?;
                index.insert(hash.as_bytes(), rec_bytes.clone())?;
                if let Some(b) = &best_bytes {
                    meta.insert(KEY_BEST, b.clone())?;
                }
                Ok(())
            });
        res.map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Remove a block body and index record (reorg eviction).
    pub fn remove_block(&self, hash: &Hash32) -> Result<(), StoreError> {
        self.blocks.remove(hash.as_bytes())?;
        self.index.remove(hash.as_bytes())?;
        Ok(())
    }

    /// Flush sled to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl BlockStore for ChainDb {
    fn read(&self, entry: &IndexEntry) -> Result<Block, StoreError> {
        self.get_block(&entry.hash)?
            .ok_or(StoreError::MissingBlock(entry.hash))
    }
}
