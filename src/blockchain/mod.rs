pub mod active_chain;
pub mod block_index;
pub mod chain_index;
pub mod chain_power;
pub mod chain_state;
pub mod header;
pub mod locator;

pub use active_chain::ActiveChain;
pub use block_index::{BlockId, BlockIndex};
pub use chain_index::ChainIndex;
pub use chain_power::ChainPower;
pub use chain_state::{AcceptOutcome, ChainState, Reorg};
pub use header::BlockHeader;
pub use locator::BlockLocator;
