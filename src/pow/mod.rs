pub mod difficulty;
pub mod equihash;

pub use difficulty::{block_proof, check_proof_of_work, compact_to_target, target_to_compact};
pub use equihash::{EquihashError, EquihashParams, EquihashVerifier};
