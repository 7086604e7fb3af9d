// TWINS-Core/twins_chain_core/src/blockchain/active_chain.rs
use crate::blockchain::block_index::BlockId;
use crate::blockchain::chain_index::ChainIndex;
use crate::error::ChainError;

/// The canonical path from genesis to the current tip, indexed by height.
///
/// Holds handles into a `ChainIndex` and never owns entries. For every
/// populated height `h`, `chain[h]` has height `h` and its parent is
/// `chain[h - 1]`.
#[derive(Debug, Default, Clone)]
pub struct ActiveChain {
    chain: Vec<BlockId>,
}

impl ActiveChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn genesis(&self) -> Option<BlockId> {
        self.chain.first().copied()
    }

    pub fn tip(&self) -> Option<BlockId> {
        self.chain.last().copied()
    }

    /// Height of the tip, `None` for an empty chain.
    pub fn height(&self) -> Option<u32> {
        self.chain.len().checked_sub(1).map(|h| h as u32)
    }

    pub fn get(&self, height: u32) -> Option<BlockId> {
        self.chain.get(height as usize).copied()
    }

    pub fn contains(&self, index: &ChainIndex, id: BlockId) -> bool {
        self.get(index.entry(id).height) == Some(id)
    }

    /// Successor of `id` on the active chain, if `id` is on it and not the tip.
    pub fn next(&self, index: &ChainIndex, id: BlockId) -> Option<BlockId> {
        if self.contains(index, id) {
            self.get(index.entry(id).height + 1)
        } else {
            None
        }
    }

    /// Makes `tip` the active tip. Only the suffix that differs from the
    /// current chain is rewritten; `None` clears the chain.
    pub fn set_tip(&mut self, index: &ChainIndex, tip: Option<BlockId>) {
        let Some(tip) = tip else {
            self.chain.clear();
            return;
        };

        let mut suffix = Vec::new();
        let mut cursor = Some(tip);
        while let Some(id) = cursor {
            let entry = index.entry(id);
            if self.get(entry.height) == Some(id) {
                break;
            }
            suffix.push(id);
            cursor = entry.prev;
        }

        let keep = index.entry(tip).height as usize + 1 - suffix.len();
        self.chain.truncate(keep);
        self.chain.extend(suffix.into_iter().rev());
    }

    /// Last entry shared by the active chain and the path to `id`, or `None`
    /// when there is no such entry (empty chain, or no `id`).
    pub fn find_fork(&self, index: &ChainIndex, id: Option<BlockId>) -> Result<Option<BlockId>, ChainError> {
        let (Some(mut id), Some(tip_height)) = (id, self.height()) else {
            return Ok(None);
        };
        if index.entry(id).height > tip_height {
            id = index.get_ancestor(id, tip_height)?;
        }
        while !self.contains(index, id) {
            match index.entry(id).prev {
                Some(prev) => id = prev,
                None => return Ok(None),
            }
        }
        Ok(Some(id))
    }
}
