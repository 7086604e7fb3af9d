// TWINS-Core/twins_chain_core/src/blockchain/locator.rs
use byteorder::{ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Read, Write};

use crate::blockchain::active_chain::ActiveChain;
use crate::blockchain::block_index::BlockId;
use crate::blockchain::chain_index::ChainIndex;
use crate::encoding::{read_hash, read_var_int, write_var_int, Decodable, Encodable};
use crate::error::ChainError;
use crate::util::Hash256;

/// Same bound peers apply to locators inside getheaders/getblocks.
pub const MAX_LOCATOR_HASHES: u64 = 2000;

/// Exponentially spaced hashes, most recent first, ending at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BlockLocator {
    pub hashes: Vec<Hash256>,
}

impl BlockLocator {
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl ActiveChain {
    /// Locator starting at `from` (the tip when `None`). The first ten
    /// entries step back one block each, after which the step doubles.
    /// Jumps use the height array while on the active chain and the skip
    /// list otherwise.
    pub fn get_locator(&self, index: &ChainIndex, from: Option<BlockId>) -> Result<BlockLocator, ChainError> {
        let mut hashes = Vec::with_capacity(32);
        let Some(mut id) = from.or_else(|| self.tip()) else {
            return Ok(BlockLocator { hashes });
        };

        let mut step = 1u32;
        loop {
            let entry = index.entry(id);
            hashes.push(entry.hash);
            if entry.height == 0 {
                break;
            }
            let height = entry.height.saturating_sub(step);
            id = match self.get(height) {
                Some(on_chain) if self.contains(index, id) => on_chain,
                _ => index.get_ancestor(id, height)?,
            };
            if hashes.len() > 10 {
                step = step.saturating_mul(2);
            }
        }
        Ok(BlockLocator { hashes })
    }
}

impl Encodable for BlockLocator {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError> {
        let mut written = write_var_int(w, self.hashes.len() as u64)?;
        for hash in &self.hashes {
            w.write_all(hash)?;
            written += 32;
        }
        Ok(written)
    }
}

impl Decodable for BlockLocator {
    fn consensus_decode<R: Read + ReadBytesExt>(r: &mut R) -> Result<Self, IoError> {
        let count = read_var_int(r)?;
        if count > MAX_LOCATOR_HASHES {
            return Err(IoError::new(IoErrorKind::InvalidData, "block locator hash count too large"));
        }
        let mut hashes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            hashes.push(read_hash(r)?);
        }
        Ok(BlockLocator { hashes })
    }
}
