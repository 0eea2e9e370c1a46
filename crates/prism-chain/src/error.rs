//! Index and storage errors.

use prism_core::Hash32;
use thiserror::Error;

/// Errors produced by the persistent block store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored record failed to decode.
    #[error("codec error: {0}")]
    Codec(String),

    /// The requested block body is not in the store.
    #[error("block {0} missing from store")]
    MissingBlock(Hash32),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Errors produced by block index mutation.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The parent hash is not present in the index.
    #[error("unknown parent block {0}")]
    UnknownParent(Hash32),

    /// The hash is already present in the index.
    #[error("duplicate block {0}")]
    DuplicateBlock(Hash32),

    /// Only the most recently appended entry can be removed.
    #[error("entry {0} is not the removable tip")]
    NotTip(Hash32),
}
