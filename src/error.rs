// TWINS-Core/twins_chain_core/src/error.rs
use thiserror::Error;

use crate::pow::equihash::EquihashError;
use crate::util::{hash_to_hex, Hash256};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record encoding error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt block index record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ChainError {
    /// Requested height lies outside `[0, entry height]`. Not an invariant
    /// violation; heights beyond a tip are legitimate queries.
    #[error("ancestor height {requested} out of range for block at height {height}")]
    AncestorOutOfRange { requested: u32, height: u32 },

    /// A non-genesis entry without a parent. The index is corrupt.
    #[error("block index corrupt: {} at height {height} has no previous entry", hash_to_hex(.hash))]
    MissingPrevious { hash: Hash256, height: u32 },

    #[error("unknown block {}", hash_to_hex(.0))]
    UnknownBlock(Hash256),

    #[error("parent {} of block {} is not in the index", hash_to_hex(.parent), hash_to_hex(.hash))]
    UnknownParent { hash: Hash256, parent: Hash256 },

    #[error("parentless block {} does not match genesis {}", hash_to_hex(.hash), hash_to_hex(.genesis))]
    GenesisMismatch { hash: Hash256, genesis: Hash256 },

    #[error("invalid proof-of-work: {0}")]
    InvalidProofOfWork(#[from] EquihashError),

    #[error("invalid difficulty target bits {bits:#010x}")]
    InvalidTarget { bits: u32 },

    #[error("block hash {} does not meet target bits {bits:#010x}", hash_to_hex(.hash))]
    HighHash { hash: Hash256, bits: u32 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for ChainError {
    fn from(e: rusqlite::Error) -> Self {
        ChainError::Storage(StorageError::Sqlite(e))
    }
}
