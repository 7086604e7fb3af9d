// TWINS-Core/twins_chain_core/src/storage.rs
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use primitive_types::U256;
use rusqlite::{params, Connection, OptionalExtension};
use std::io::{Error as IoError, Read, Write};

use crate::encoding::{read_hash, read_var_int, write_var_int, Encodable};
use crate::error::StorageError;
use crate::util::{hash_to_hex, Hash256, NULL_HASH};

/// Persisted form of a block index entry. The skip pointer is not stored;
/// it is rebuilt from the parent link when the index is reloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskBlockIndex {
    pub hash: Hash256,
    pub height: u32,
    pub work: U256,
    pub stake: U256,
    /// All zero for genesis.
    pub prev_hash: Hash256,
    pub time: u32,
    pub bits: u32,
}

impl DiskBlockIndex {
    pub fn prev(&self) -> Option<Hash256> {
        if self.prev_hash == NULL_HASH {
            None
        } else {
            Some(self.prev_hash)
        }
    }
}

// The hash is the store key and is not part of the value encoding.
impl Encodable for DiskBlockIndex {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError> {
        let mut written = write_var_int(w, self.height as u64)?;
        let mut buf = [0u8; 32];
        self.work.to_little_endian(&mut buf);
        w.write_all(&buf)?;
        self.stake.to_little_endian(&mut buf);
        w.write_all(&buf)?;
        w.write_all(&self.prev_hash)?;
        w.write_u32::<LittleEndian>(self.time)?;
        w.write_u32::<LittleEndian>(self.bits)?;
        written += 32 * 3 + 8;
        Ok(written)
    }
}

impl DiskBlockIndex {
    pub fn decode_value<R: Read + ReadBytesExt>(hash: Hash256, r: &mut R) -> Result<Self, IoError> {
        let height = read_var_int(r)?;
        let height = u32::try_from(height)
            .map_err(|_| IoError::new(std::io::ErrorKind::InvalidData, "block height exceeds u32"))?;
        let work = U256::from_little_endian(&read_hash(r)?);
        let stake = U256::from_little_endian(&read_hash(r)?);
        Ok(DiskBlockIndex {
            hash,
            height,
            work,
            stake,
            prev_hash: read_hash(r)?,
            time: r.read_u32::<LittleEndian>()?,
            bits: r.read_u32::<LittleEndian>()?,
        })
    }

    fn from_row(hash_bytes: Vec<u8>, value: Vec<u8>) -> Result<Self, StorageError> {
        let hash: Hash256 = hash_bytes.as_slice().try_into().map_err(|_| StorageError::Corrupt {
            key: hex::encode(&hash_bytes),
            reason: "key is not 32 bytes".to_string(),
        })?;
        let mut cursor = std::io::Cursor::new(value);
        let record = Self::decode_value(hash, &mut cursor)?;
        if cursor.position() as usize != cursor.get_ref().len() {
            return Err(StorageError::Corrupt { key: hash_to_hex(&hash), reason: "trailing bytes".to_string() });
        }
        Ok(record)
    }
}

/// Hash-keyed durable store for the block index.
pub trait BlockIndexStore: Send + Sync + std::fmt::Debug {
    /// Entries are written once; saving a known hash is a no-op.
    fn save_index(&self, record: &DiskBlockIndex) -> Result<(), StorageError>;
    fn get_index(&self, hash: &Hash256) -> Result<Option<DiskBlockIndex>, StorageError>;
    /// Every stored entry in ascending height order, so parents precede children.
    fn load_all(&self) -> Result<Vec<DiskBlockIndex>, StorageError>;
    fn get_chain_tip_hash(&self) -> Result<Option<Hash256>, StorageError>;
    fn set_chain_tip_hash(&self, hash: &Hash256) -> Result<(), StorageError>;
    fn reset(&self) -> Result<(), StorageError>;
}

pub struct SqliteBlockStorage {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteBlockStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBlockStorage")
            .field("conn", &"Mutex<Connection>")
            .finish()
    }
}

impl SqliteBlockStorage {
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS block_index (hash BLOB PRIMARY KEY, height INTEGER NOT NULL, record BLOB NOT NULL)",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_block_index_height ON block_index (height)", [])?;
        conn.execute("CREATE TABLE IF NOT EXISTS chain_metadata (key TEXT PRIMARY KEY, value_blob BLOB)", [])?;
        Ok(SqliteBlockStorage { conn: Mutex::new(conn) })
    }
}

impl BlockIndexStore for SqliteBlockStorage {
    fn save_index(&self, record: &DiskBlockIndex) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO block_index (hash, height, record) VALUES (?1, ?2, ?3)",
            params![record.hash.to_vec(), record.height, record.to_bytes()],
        )?;
        Ok(())
    }

    fn get_index(&self, hash: &Hash256) -> Result<Option<DiskBlockIndex>, StorageError> {
        let conn = self.conn.lock();
        let value: Option<Vec<u8>> = conn
            .query_row("SELECT record FROM block_index WHERE hash = ?1", params![hash.to_vec()], |row| row.get(0))
            .optional()?;
        value.map(|v| DiskBlockIndex::from_row(hash.to_vec(), v)).transpose()
    }

    fn load_all(&self) -> Result<Vec<DiskBlockIndex>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT hash, record FROM block_index ORDER BY height ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?)))?;
        let mut records = Vec::new();
        for row in rows {
            let (hash, value) = row?;
            records.push(DiskBlockIndex::from_row(hash, value)?);
        }
        Ok(records)
    }

    fn get_chain_tip_hash(&self) -> Result<Option<Hash256>, StorageError> {
        let conn = self.conn.lock();
        let value: Option<Vec<u8>> = conn
            .query_row("SELECT value_blob FROM chain_metadata WHERE key = 'chain_tip_hash'", [], |row| row.get(0))
            .optional()?;
        match value {
            None => Ok(None),
            Some(v) => {
                let hash: Hash256 = v.as_slice().try_into().map_err(|_| StorageError::Corrupt {
                    key: "chain_tip_hash".to_string(),
                    reason: format!("{} bytes", v.len()),
                })?;
                Ok(Some(hash))
            }
        }
    }

    fn set_chain_tip_hash(&self, hash: &Hash256) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO chain_metadata (key, value_blob) VALUES ('chain_tip_hash', ?1)",
            params![hash.to_vec()],
        )?;
        Ok(())
    }

    fn reset(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM block_index", [])?;
        conn.execute("DELETE FROM chain_metadata", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(height: u32, prev: Hash256) -> DiskBlockIndex {
        let mut hash = [0u8; 32];
        hash[..4].copy_from_slice(&height.to_le_bytes());
        DiskBlockIndex {
            hash,
            height,
            work: U256::from(height as u64 + 1) << 200usize,
            stake: U256::from(height * 3),
            prev_hash: prev,
            time: 1_500_000_000 + height,
            bits: 0x1f07ffff,
        }
    }

    #[test]
    fn value_layout() {
        let r = record(300, [9u8; 32]);
        let bytes = r.to_bytes();
        // 3-byte varint for 300, then work, stake, prev, time, bits.
        assert_eq!(bytes.len(), 3 + 32 * 3 + 8);
        assert_eq!(&bytes[..3], &[0xfd, 0x2c, 0x01]);
        let decoded = DiskBlockIndex::decode_value(r.hash, &mut std::io::Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded, r);
        assert_eq!(decoded.prev(), Some([9u8; 32]));
        assert_eq!(record(0, NULL_HASH).prev(), None);
    }

    #[test]
    fn save_load_and_ordering() {
        let store = SqliteBlockStorage::in_memory().unwrap();
        let genesis = record(0, NULL_HASH);
        let first = record(1, genesis.hash);
        let second = record(2, first.hash);
        // Insert out of order; load_all must still return parents first.
        store.save_index(&second).unwrap();
        store.save_index(&genesis).unwrap();
        store.save_index(&first).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all, vec![genesis.clone(), first.clone(), second.clone()]);
        assert_eq!(store.get_index(&first.hash).unwrap(), Some(first.clone()));
        assert_eq!(store.get_index(&[0xee; 32]).unwrap(), None);
    }

    #[test]
    fn saved_entries_are_not_overwritten() {
        let store = SqliteBlockStorage::in_memory().unwrap();
        let original = record(5, [1u8; 32]);
        store.save_index(&original).unwrap();
        let mut altered = original.clone();
        altered.stake = U256::from(999u32);
        store.save_index(&altered).unwrap();
        assert_eq!(store.get_index(&original.hash).unwrap(), Some(original));
    }

    #[test]
    fn tip_hash_and_reset() {
        let store = SqliteBlockStorage::in_memory().unwrap();
        assert_eq!(store.get_chain_tip_hash().unwrap(), None);
        store.set_chain_tip_hash(&[7u8; 32]).unwrap();
        store.set_chain_tip_hash(&[8u8; 32]).unwrap();
        assert_eq!(store.get_chain_tip_hash().unwrap(), Some([8u8; 32]));
        store.save_index(&record(0, NULL_HASH)).unwrap();
        store.reset().unwrap();
        assert_eq!(store.get_chain_tip_hash().unwrap(), None);
        assert!(store.load_all().unwrap().is_empty());
    }
}
