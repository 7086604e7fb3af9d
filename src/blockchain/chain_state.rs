// TWINS-Core/twins_chain_core/src/blockchain/chain_state.rs
use parking_lot::RwLock;
use primitive_types::U256;
use std::sync::Arc;

use crate::blockchain::active_chain::ActiveChain;
use crate::blockchain::block_index::{BlockId, BlockIndex};
use crate::blockchain::chain_index::ChainIndex;
use crate::blockchain::chain_power::ChainPower;
use crate::blockchain::header::BlockHeader;
use crate::blockchain::locator::BlockLocator;
use crate::chainparams::ChainParams;
use crate::error::ChainError;
use crate::pow::difficulty::block_proof_equivalent_time;
use crate::pow::{block_proof, check_proof_of_work, equihash::verify_header};
use crate::storage::{BlockIndexStore, DiskBlockIndex};
use crate::util::{hash_to_hex, Hash256, NULL_HASH};

/// Active chain switch caused by accepting a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reorg {
    pub fork: Hash256,
    pub fork_height: u32,
    /// Blocks that left the active chain, old tip first.
    pub disconnected: Vec<Hash256>,
    /// Blocks that joined the active chain, lowest first, ending at the new tip.
    pub connected: Vec<Hash256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub hash: Hash256,
    pub height: u32,
    pub already_known: bool,
    pub became_tip: bool,
    pub reorg: Option<Reorg>,
}

impl AcceptOutcome {
    fn known(entry: &BlockIndex) -> Self {
        AcceptOutcome { hash: entry.hash, height: entry.height, already_known: true, became_tip: false, reorg: None }
    }
}

struct ChainInner {
    index: ChainIndex,
    active: ActiveChain,
}

/// Header-chain state shared by the node: every known entry plus the active
/// chain, behind one lock so readers always see the two in agreement.
pub struct ChainState {
    inner: RwLock<ChainInner>,
    params: &'static ChainParams,
    genesis_hash: Hash256,
    storage: Arc<dyn BlockIndexStore>,
}

impl std::fmt::Debug for ChainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ChainState")
            .field("network", &self.params.network)
            .field("index_len", &inner.index.len())
            .field("tip_height", &inner.active.height())
            .field("genesis_hash", &hash_to_hex(&self.genesis_hash))
            .field("storage", &"Arc<dyn BlockIndexStore>")
            .finish()
    }
}

impl ChainState {
    /// Rebuilds the index from `storage`, seeding it with the network's
    /// genesis on first start.
    pub fn new(params: &'static ChainParams, storage: Arc<dyn BlockIndexStore>) -> Result<Self, ChainError> {
        let genesis_hash = params.genesis_hash();
        let mut index = ChainIndex::new();

        let records = storage.load_all()?;
        match records.first() {
            None => {
                log::info!(
                    "No block index in storage. Seeding {} genesis {}",
                    params.network_id_string,
                    hash_to_hex(&genesis_hash)
                );
                let genesis = params.genesis_header();
                let power = ChainPower::new(0, block_proof(genesis.bits), U256::zero());
                storage.save_index(&DiskBlockIndex {
                    hash: genesis_hash,
                    height: 0,
                    work: power.work,
                    stake: power.stake,
                    prev_hash: NULL_HASH,
                    time: genesis.time,
                    bits: genesis.bits,
                })?;
                storage.set_chain_tip_hash(&genesis_hash)?;
                index.restore(genesis_hash, None, power, genesis.time, genesis.bits)?;
            }
            Some(first) if first.hash != genesis_hash => {
                return Err(ChainError::GenesisMismatch { hash: first.hash, genesis: genesis_hash });
            }
            Some(_) => {
                for record in &records {
                    let power = ChainPower::new(record.height, record.work, record.stake);
                    index.restore(record.hash, record.prev(), power, record.time, record.bits)?;
                }
                log::info!("Loaded {} block index entries from storage", index.len());
            }
        }

        let tip = match storage.get_chain_tip_hash()?.and_then(|hash| index.lookup(&hash)) {
            Some(tip) => tip,
            None => {
                let best = most_powerful(&index).ok_or(ChainError::UnknownBlock(genesis_hash))?;
                let best_hash = index.entry(best).hash;
                log::warn!("Stored chain tip missing or unknown. Falling back to best entry {}", hash_to_hex(&best_hash));
                storage.set_chain_tip_hash(&best_hash)?;
                best
            }
        };

        let mut active = ActiveChain::new();
        active.set_tip(&index, Some(tip));
        log::info!(
            "Chain state ready: tip height={}, hash={}",
            index.entry(tip).height,
            hash_to_hex(&index.entry(tip).hash)
        );

        Ok(ChainState { inner: RwLock::new(ChainInner { index, active }), params, genesis_hash, storage })
    }

    pub fn params(&self) -> &'static ChainParams {
        self.params
    }

    pub fn genesis_hash(&self) -> Hash256 {
        self.genesis_hash
    }

    /// Validates and indexes a header carrying `stake` worth of stake, moving
    /// the active tip when the new entry's chain is strictly more powerful.
    /// Ties keep the current tip.
    pub fn accept_header(&self, header: &BlockHeader, stake: U256) -> Result<AcceptOutcome, ChainError> {
        let hash = header.get_hash();
        {
            let inner = self.inner.read();
            if let Some(known) = inner.index.get(&hash) {
                return Ok(AcceptOutcome::known(known));
            }
        }

        if !self.params.skip_equihash {
            verify_header(&self.params.equihash_params(), header)?;
        }
        check_proof_of_work(&hash, header.bits, self.params.pow_limit())?;

        let mut guard = self.inner.write();
        let inner = &mut *guard;
        // Another writer may have won the race since the read check.
        if let Some(known) = inner.index.get(&hash) {
            return Ok(AcceptOutcome::known(known));
        }

        let block_work = block_proof(header.bits);
        let parent = match header.prev_hash() {
            Some(parent) => inner.index.get(&parent).ok_or(ChainError::UnknownParent { hash, parent })?,
            None => return Err(ChainError::GenesisMismatch { hash, genesis: self.genesis_hash }),
        };
        let power = parent.power.extend(block_work, stake);
        let record = DiskBlockIndex {
            hash,
            height: power.height,
            work: power.work,
            stake: power.stake,
            prev_hash: parent.hash,
            time: header.time,
            bits: header.bits,
        };
        self.storage.save_index(&record)?;
        let id = inner.index.insert(hash, Some(record.prev_hash), block_work, stake, header.time, header.bits)?;
        log::debug!("Indexed header height={}, hash={}", power.height, hash_to_hex(&hash));

        let mut outcome =
            AcceptOutcome { hash, height: power.height, already_known: false, became_tip: false, reorg: None };
        let Some(tip) = inner.active.tip() else {
            return Ok(outcome);
        };
        if !(power > inner.index.entry(tip).power) {
            return Ok(outcome);
        }

        let fork = inner
            .active
            .find_fork(&inner.index, Some(id))?
            .ok_or(ChainError::MissingPrevious { hash, height: power.height })?;
        let fork_entry = inner.index.entry(fork);
        let tip_height = inner.index.entry(tip).height;
        let disconnected: Vec<Hash256> = (fork_entry.height + 1..=tip_height)
            .rev()
            .filter_map(|height| inner.active.get(height))
            .map(|id| inner.index.entry(id).hash)
            .collect();
        let connected = path_from(&inner.index, fork, id)?;

        self.storage.set_chain_tip_hash(&hash)?;
        inner.active.set_tip(&inner.index, Some(id));
        outcome.became_tip = true;

        if !disconnected.is_empty() {
            log::warn!(
                "Reorganize: fork at height={} ({}), disconnecting {} and connecting {} blocks",
                fork_entry.height,
                hash_to_hex(&fork_entry.hash),
                disconnected.len(),
                connected.len()
            );
            outcome.reorg = Some(Reorg { fork: fork_entry.hash, fork_height: fork_entry.height, disconnected, connected });
        }
        log::info!("New chain tip: height={}, hash={}", power.height, hash_to_hex(&hash));
        Ok(outcome)
    }

    pub fn tip(&self) -> Option<BlockIndex> {
        let inner = self.inner.read();
        inner.active.tip().map(|id| inner.index.entry(id).clone())
    }

    pub fn height(&self) -> Option<u32> {
        self.inner.read().active.height()
    }

    pub fn block_count(&self) -> usize {
        self.inner.read().index.len()
    }

    pub fn get_block_index(&self, hash: &Hash256) -> Option<BlockIndex> {
        self.inner.read().index.get(hash).cloned()
    }

    /// Locator from `from` (the tip when `None`).
    pub fn locator(&self, from: Option<&Hash256>) -> Result<BlockLocator, ChainError> {
        let inner = self.inner.read();
        let from = match from {
            Some(hash) => Some(inner.index.lookup(hash).ok_or(ChainError::UnknownBlock(*hash))?),
            None => None,
        };
        inner.active.get_locator(&inner.index, from)
    }

    /// Last active-chain block on the path to `hash`.
    pub fn find_fork(&self, hash: &Hash256) -> Result<Option<Hash256>, ChainError> {
        let inner = self.inner.read();
        let id = inner.index.lookup(hash).ok_or(ChainError::UnknownBlock(*hash))?;
        Ok(inner.active.find_fork(&inner.index, Some(id))?.map(|fork| inner.index.entry(fork).hash))
    }

    /// First locator entry that sits on the active chain, falling back to
    /// genesis when none does. Returns the hash and height.
    pub fn find_locator_fork(&self, locator: &BlockLocator) -> Option<(Hash256, u32)> {
        let inner = self.inner.read();
        locator
            .hashes
            .iter()
            .filter_map(|hash| inner.index.lookup(hash))
            .find(|&id| inner.active.contains(&inner.index, id))
            .or_else(|| inner.active.genesis())
            .map(|id| {
                let entry = inner.index.entry(id);
                (entry.hash, entry.height)
            })
    }

    pub fn ancestor_hash(&self, hash: &Hash256, height: u32) -> Result<Hash256, ChainError> {
        let inner = self.inner.read();
        let id = inner.index.lookup(hash).ok_or(ChainError::UnknownBlock(*hash))?;
        let ancestor = inner.index.get_ancestor(id, height)?;
        Ok(inner.index.entry(ancestor).hash)
    }

    /// Whether `hash` is on the active chain.
    pub fn contains(&self, hash: &Hash256) -> bool {
        let inner = self.inner.read();
        inner.index.lookup(hash).map_or(false, |id| inner.active.contains(&inner.index, id))
    }

    pub fn hash_at_height(&self, height: u32) -> Option<Hash256> {
        let inner = self.inner.read();
        inner.active.get(height).map(|id| inner.index.entry(id).hash)
    }

    /// Seconds of block production at the tip's difficulty that separate the
    /// cumulative work of `to` from that of `from`. Negative when `from` has more.
    pub fn proof_equivalent_time(&self, to: &Hash256, from: &Hash256) -> Result<i64, ChainError> {
        let inner = self.inner.read();
        let to = inner.index.get(to).ok_or(ChainError::UnknownBlock(*to))?;
        let from = inner.index.get(from).ok_or(ChainError::UnknownBlock(*from))?;
        let tip = inner.active.tip().ok_or(ChainError::UnknownBlock(self.genesis_hash))?;
        Ok(block_proof_equivalent_time(
            to.power.work,
            from.power.work,
            inner.index.entry(tip).bits,
            self.params.pow_target_spacing,
        ))
    }
}

fn most_powerful(index: &ChainIndex) -> Option<BlockId> {
    let mut best = index.genesis()?;
    for entry in index.iter() {
        if entry.power > index.entry(best).power {
            best = entry.id;
        }
    }
    Some(best)
}

// Hashes after `fork` up to and including `to`, lowest first.
fn path_from(index: &ChainIndex, fork: BlockId, to: BlockId) -> Result<Vec<Hash256>, ChainError> {
    let mut path = Vec::new();
    let mut cursor = to;
    while cursor != fork {
        let entry = index.entry(cursor);
        path.push(entry.hash);
        cursor = entry.prev.ok_or(ChainError::MissingPrevious { hash: entry.hash, height: entry.height })?;
    }
    path.reverse();
    Ok(path)
}
