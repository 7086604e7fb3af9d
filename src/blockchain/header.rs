// TWINS-Core/twins_chain_core/src/blockchain/header.rs
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use std::io::{Error as IoError, Read, Write};

use crate::encoding::{read_hash, read_var_bytes, write_var_bytes, Decodable, Encodable};
use crate::util::{Hash256, NULL_HASH};

/// Serialized length of the header fields that precede the nonce. This
/// prefix is the Equihash input `I`.
pub const EQUIHASH_INPUT_LEN: usize = 4 + 32 + 32 + 32 + 4 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Hash256,
    pub merkle_root: Hash256,
    pub final_sapling_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: Hash256,
    /// Minimally encoded Equihash solution.
    pub solution: Vec<u8>,
}

impl BlockHeader {
    pub fn get_hash(&self) -> Hash256 {
        let h1 = Sha256::digest(self.to_bytes());
        let h2 = Sha256::digest(h1);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&h2);
        hash
    }

    pub fn prev_hash(&self) -> Option<Hash256> {
        if self.prev_block_hash == NULL_HASH {
            None
        } else {
            Some(self.prev_block_hash)
        }
    }

    pub fn equihash_input(&self) -> Vec<u8> {
        let mut input = Vec::with_capacity(EQUIHASH_INPUT_LEN);
        // Writing into a Vec cannot fail.
        let _ = self.encode_input(&mut input);
        input
    }

    fn encode_input<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError> {
        w.write_i32::<LittleEndian>(self.version)?;
        w.write_all(&self.prev_block_hash)?;
        w.write_all(&self.merkle_root)?;
        w.write_all(&self.final_sapling_root)?;
        w.write_u32::<LittleEndian>(self.time)?;
        w.write_u32::<LittleEndian>(self.bits)?;
        Ok(EQUIHASH_INPUT_LEN)
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError> {
        let mut written = self.encode_input(w)?;
        w.write_all(&self.nonce)?;
        written += 32;
        written += write_var_bytes(w, &self.solution)?;
        Ok(written)
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode<R: Read + ReadBytesExt>(r: &mut R) -> Result<Self, IoError> {
        Ok(BlockHeader {
            version: r.read_i32::<LittleEndian>()?,
            prev_block_hash: read_hash(r)?,
            merkle_root: read_hash(r)?,
            final_sapling_root: read_hash(r)?,
            time: r.read_u32::<LittleEndian>()?,
            bits: r.read_u32::<LittleEndian>()?,
            nonce: read_hash(r)?,
            solution: read_var_bytes(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: 4,
            prev_block_hash: [0x11; 32],
            merkle_root: [0x22; 32],
            final_sapling_root: [0x33; 32],
            time: 1_600_000_000,
            bits: 0x200f0f0f,
            nonce: [0x44; 32],
            solution: vec![0x55; 36],
        }
    }

    #[test]
    fn layout_and_decode() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), EQUIHASH_INPUT_LEN + 32 + 1 + 36);
        assert_eq!(&bytes[..EQUIHASH_INPUT_LEN], header.equihash_input().as_slice());
        assert_eq!(&bytes[EQUIHASH_INPUT_LEN..EQUIHASH_INPUT_LEN + 32], &[0x44; 32]);
        assert_eq!(BlockHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn hash_covers_solution() {
        let header = sample_header();
        let mut other = header.clone();
        other.solution[0] ^= 1;
        assert_ne!(header.get_hash(), other.get_hash());
        assert_eq!(header.prev_hash(), Some([0x11; 32]));
        other.prev_block_hash = NULL_HASH;
        assert_eq!(other.prev_hash(), None);
    }
}
