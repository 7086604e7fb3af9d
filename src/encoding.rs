// TWINS-Core/twins_chain_core/src/encoding.rs
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Read, Write};

/// Upper bound on any length-prefixed byte field we are willing to allocate for.
pub const MAX_VAR_BYTES: u64 = 2 * 1024 * 1024;

pub trait Encodable {
    fn consensus_encode<W: Write + WriteBytesExt>(&self, w: &mut W) -> Result<usize, IoError>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.consensus_encode(&mut buf);
        buf
    }
}

pub trait Decodable: Sized {
    fn consensus_decode<R: Read + ReadBytesExt>(r: &mut R) -> Result<Self, IoError>;

    fn from_bytes(bytes: &[u8]) -> Result<Self, IoError> {
        let mut cursor = std::io::Cursor::new(bytes);
        let value = Self::consensus_decode(&mut cursor)?;
        if cursor.position() as usize != bytes.len() {
            return Err(IoError::new(IoErrorKind::InvalidData, "trailing bytes after object"));
        }
        Ok(value)
    }
}

pub fn write_var_int<W: Write + WriteBytesExt>(w: &mut W, n: u64) -> Result<usize, IoError> {
    if n < 0xfd {
        w.write_u8(n as u8)?;
        Ok(1)
    } else if n <= 0xffff {
        w.write_u8(0xfd)?;
        w.write_u16::<LittleEndian>(n as u16)?;
        Ok(3)
    } else if n <= 0xffff_ffff {
        w.write_u8(0xfe)?;
        w.write_u32::<LittleEndian>(n as u32)?;
        Ok(5)
    } else {
        w.write_u8(0xff)?;
        w.write_u64::<LittleEndian>(n)?;
        Ok(9)
    }
}

/// Reads a CompactSize integer, rejecting non-canonical encodings.
pub fn read_var_int<R: Read + ReadBytesExt>(r: &mut R) -> Result<u64, IoError> {
    let (value, min) = match r.read_u8()? {
        0xff => (r.read_u64::<LittleEndian>()?, 0x1_0000_0000),
        0xfe => (r.read_u32::<LittleEndian>()? as u64, 0x1_0000),
        0xfd => (r.read_u16::<LittleEndian>()? as u64, 0xfd),
        n => return Ok(n as u64),
    };
    if value < min {
        return Err(IoError::new(IoErrorKind::InvalidData, "non-canonical CompactSize"));
    }
    Ok(value)
}

pub fn write_var_bytes<W: Write + WriteBytesExt>(w: &mut W, b: &[u8]) -> Result<usize, IoError> {
    let len = write_var_int(w, b.len() as u64)?;
    w.write_all(b)?;
    Ok(len + b.len())
}

pub fn read_var_bytes<R: Read + ReadBytesExt>(r: &mut R) -> Result<Vec<u8>, IoError> {
    let len = read_var_int(r)?;
    if len > MAX_VAR_BYTES {
        return Err(IoError::new(IoErrorKind::InvalidData, "VarBytes too long"));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_hash<R: Read>(r: &mut R) -> Result<[u8; 32], IoError> {
    let mut hash = [0u8; 32];
    r.read_exact(&mut hash)?;
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn var_int_boundaries() {
        for (value, width) in [(0u64, 1usize), (0xfc, 1), (0xfd, 3), (0xffff, 3), (0x1_0000, 5), (0x1_0000_0000, 9)] {
            let mut buf = Vec::new();
            assert_eq!(write_var_int(&mut buf, value).unwrap(), width);
            assert_eq!(buf.len(), width);
            assert_eq!(read_var_int(&mut Cursor::new(&buf)).unwrap(), value);
        }
    }

    #[test]
    fn non_canonical_var_int_is_rejected() {
        let buf = [0xfdu8, 0x10, 0x00];
        assert!(read_var_int(&mut Cursor::new(&buf[..])).is_err());
    }

    #[test]
    fn oversized_var_bytes_is_rejected() {
        let mut buf = Vec::new();
        write_var_int(&mut buf, MAX_VAR_BYTES + 1).unwrap();
        assert!(read_var_bytes(&mut Cursor::new(&buf)).is_err());
    }
}
