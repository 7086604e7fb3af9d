// TWINS-Core/twins_chain_core/src/util.rs

/// 32-byte block hash in internal (little-endian) byte order.
pub type Hash256 = [u8; 32];

pub const NULL_HASH: Hash256 = [0u8; 32];

// Hashes are displayed byte-reversed, the way block explorers and RPC show them.
pub fn hash_to_hex(hash: &Hash256) -> String {
    let mut display = *hash;
    display.reverse();
    hex::encode(display)
}

pub fn hash_from_hex(display_hex: &str) -> Result<Hash256, hex::FromHexError> {
    let mut hash = [0u8; 32];
    hex::decode_to_slice(display_hex.trim_start_matches("0x"), &mut hash)?;
    hash.reverse();
    Ok(hash)
}
