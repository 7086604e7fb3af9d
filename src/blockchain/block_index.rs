// TWINS-Core/twins_chain_core/src/blockchain/block_index.rs

use crate::blockchain::chain_power::ChainPower;
use crate::util::Hash256;

/// Stable handle of an entry inside a `ChainIndex` arena. Handles are only
/// meaningful for the index that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct BlockIndex {
    pub id: BlockId,
    pub hash: Hash256,
    pub height: u32,
    /// Parent entry; `None` only for genesis.
    pub prev: Option<BlockId>,
    /// Ancestor at `skip_height(height)`, set once when the entry is linked.
    pub skip: Option<BlockId>,
    /// Cumulative work and stake from genesis through this block.
    pub power: ChainPower,
    pub time: u32,
    pub bits: u32,
}

impl BlockIndex {
    pub fn is_genesis(&self) -> bool {
        self.prev.is_none() && self.height == 0
    }
}

fn invert_lowest_one(n: u32) -> u32 {
    n & n.wrapping_sub(1)
}

/// Height the skip pointer of a block at `height` points to.
///
/// Odd heights clear the two lowest set bits of `height - 1` and add one,
/// even heights clear the lowest set bit. The mix keeps most skips short
/// while still allowing O(log n) jumps to any target.
pub fn skip_height(height: u32) -> u32 {
    if height < 2 {
        return 0;
    }
    if height & 1 == 1 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_height_small_values() {
        assert_eq!(skip_height(0), 0);
        assert_eq!(skip_height(1), 0);
        assert_eq!(skip_height(2), 0);
        assert_eq!(skip_height(3), 1);
        assert_eq!(skip_height(4), 0);
        assert_eq!(skip_height(6), 4);
        assert_eq!(skip_height(12), 8);
        assert_eq!(skip_height(13), 1);
        assert_eq!(skip_height(15), 9);
        assert_eq!(skip_height(1024), 0);
        assert_eq!(skip_height(1025), 1);
    }

    #[test]
    fn skip_height_is_strictly_lower() {
        for height in 2..100_000u32 {
            assert!(skip_height(height) < height, "height {}", height);
        }
    }
}
