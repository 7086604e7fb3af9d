//! Header-chain consensus core for a TWINS node: the block index with skip
//! pointers, the active chain, work/stake fork choice and Equihash
//! proof-of-work verification.

pub mod blockchain;
pub mod chainparams;
pub mod config;
pub mod encoding;
pub mod error;
pub mod pow;
pub mod storage;
pub mod util;
