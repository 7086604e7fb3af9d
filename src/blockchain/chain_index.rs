// TWINS-Core/twins_chain_core/src/blockchain/chain_index.rs
use primitive_types::U256;
use std::collections::HashMap;

use crate::blockchain::block_index::{skip_height, BlockId, BlockIndex};
use crate::blockchain::chain_power::ChainPower;
use crate::error::{ChainError, StorageError};
use crate::util::{hash_to_hex, Hash256};

/// Every known block header, including forks, keyed by hash.
///
/// Entries live in an append-only arena and refer to each other through
/// `BlockId` handles. An entry's `prev`, `skip` and `power` are written once
/// when it is linked and never change afterwards, so shared references to the
/// index are safe to read from any number of threads.
#[derive(Debug, Default)]
pub struct ChainIndex {
    entries: Vec<BlockIndex>,
    by_hash: HashMap<Hash256, BlockId>,
}

impl ChainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, hash: &Hash256) -> Option<BlockId> {
        self.by_hash.get(hash).copied()
    }

    pub fn get(&self, hash: &Hash256) -> Option<&BlockIndex> {
        self.lookup(hash).map(|id| self.entry(id))
    }

    /// Panics if `id` was not issued by this index.
    pub fn entry(&self, id: BlockId) -> &BlockIndex {
        &self.entries[id.as_usize()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockIndex> {
        self.entries.iter()
    }

    /// The first entry ever inserted is always the (only) genesis.
    pub fn genesis(&self) -> Option<BlockId> {
        self.entries.first().map(|e| e.id)
    }

    /// Links a validated header under its parent, accumulating this block's
    /// work and stake onto the parent's. Inserting a known hash returns the
    /// existing entry untouched.
    pub fn insert(
        &mut self,
        hash: Hash256,
        prev_hash: Option<Hash256>,
        block_work: U256,
        block_stake: U256,
        time: u32,
        bits: u32,
    ) -> Result<BlockId, ChainError> {
        if let Some(existing) = self.lookup(&hash) {
            log::debug!("Block {} already indexed, keeping existing entry", hash_to_hex(&hash));
            return Ok(existing);
        }

        let (prev, power) = match prev_hash {
            Some(parent) => {
                let prev_id = self.lookup(&parent).ok_or(ChainError::UnknownParent { hash, parent })?;
                (Some(prev_id), self.entry(prev_id).power.extend(block_work, block_stake))
            }
            None => {
                if let Some(genesis) = self.genesis() {
                    return Err(ChainError::GenesisMismatch { hash, genesis: self.entry(genesis).hash });
                }
                (None, ChainPower::new(0, block_work, block_stake))
            }
        };

        self.link(hash, prev, power, time, bits)
    }

    /// Re-inserts a persisted entry with its stored accumulators. Parents must
    /// be restored before children.
    pub fn restore(
        &mut self,
        hash: Hash256,
        prev_hash: Option<Hash256>,
        power: ChainPower,
        time: u32,
        bits: u32,
    ) -> Result<BlockId, ChainError> {
        if let Some(existing) = self.lookup(&hash) {
            return Ok(existing);
        }
        let corrupt = |reason: String| {
            ChainError::Storage(StorageError::Corrupt { key: hash_to_hex(&hash), reason })
        };

        let prev = match prev_hash {
            Some(parent) => {
                let prev_id = self.lookup(&parent).ok_or(ChainError::UnknownParent { hash, parent })?;
                let parent_height = self.entry(prev_id).height;
                if power.height != parent_height + 1 {
                    return Err(corrupt(format!("height {} under parent at height {}", power.height, parent_height)));
                }
                Some(prev_id)
            }
            None => {
                if power.height != 0 {
                    return Err(corrupt(format!("parentless record at height {}", power.height)));
                }
                if let Some(genesis) = self.genesis() {
                    return Err(ChainError::GenesisMismatch { hash, genesis: self.entry(genesis).hash });
                }
                None
            }
        };

        self.link(hash, prev, power, time, bits)
    }

    fn link(
        &mut self,
        hash: Hash256,
        prev: Option<BlockId>,
        power: ChainPower,
        time: u32,
        bits: u32,
    ) -> Result<BlockId, ChainError> {
        let height = power.height;
        // Resolve the skip target before the entry exists so a failure leaves
        // the index unchanged.
        let skip = match prev {
            Some(prev_id) => Some(self.get_ancestor(prev_id, skip_height(height))?),
            None => None,
        };

        let id = BlockId(self.entries.len() as u32);
        self.entries.push(BlockIndex { id, hash, height, prev, skip, power, time, bits });
        self.by_hash.insert(hash, id);
        Ok(id)
    }

    /// Entry at `height` on the path from `id` back to genesis.
    ///
    /// Follows the skip pointer whenever it does not overshoot a point where
    /// the parent's skip would have been strictly better, otherwise steps to
    /// the parent. This keeps the walk to O(log height) entries.
    pub fn get_ancestor(&self, id: BlockId, height: u32) -> Result<BlockId, ChainError> {
        let start = self.entry(id);
        if height > start.height {
            return Err(ChainError::AncestorOutOfRange { requested: height, height: start.height });
        }

        let target = height as i64;
        let mut walk = start;
        while walk.height as i64 > target {
            let height_skip = skip_height(walk.height) as i64;
            let height_skip_prev = skip_height(walk.height - 1) as i64;
            let take_skip = height_skip == target
                || (height_skip > target && !(height_skip_prev < height_skip - 2 && height_skip_prev >= target));

            walk = match (walk.skip, take_skip) {
                (Some(skip), true) => self.entry(skip),
                _ => match walk.prev {
                    Some(prev) => self.entry(prev),
                    None => return Err(ChainError::MissingPrevious { hash: walk.hash, height: walk.height }),
                },
            };
        }
        Ok(walk.id)
    }

    /// Deepest entry that is an ancestor of (or equal to) both `a` and `b`.
    pub fn last_common_ancestor(&self, a: BlockId, b: BlockId) -> Result<BlockId, ChainError> {
        let (height_a, height_b) = (self.entry(a).height, self.entry(b).height);
        let mut a = if height_a > height_b { self.get_ancestor(a, height_b)? } else { a };
        let mut b = if height_b > height_a { self.get_ancestor(b, height_a)? } else { b };

        while a != b {
            let (entry_a, entry_b) = (self.entry(a), self.entry(b));
            // Both walkers sit at the same height, so their skips do too.
            match (entry_a.skip, entry_b.skip) {
                (Some(skip_a), Some(skip_b)) if skip_a != skip_b => {
                    a = skip_a;
                    b = skip_b;
                }
                _ => {
                    a = entry_a
                        .prev
                        .ok_or(ChainError::MissingPrevious { hash: entry_a.hash, height: entry_a.height })?;
                    b = entry_b
                        .prev
                        .ok_or(ChainError::MissingPrevious { hash: entry_b.hash, height: entry_b.height })?;
                }
            }
        }
        Ok(a)
    }
}
