//! A small trait for binary (de)serialization over `std::io::{Read, Write}`,
//! plus the Bitcoin-style variable-length integer ("varint" / "CompactSize").

use std::io::{Error as IOError, Read, Write};
use thiserror::Error;

/// Errors arising from (de)serialization of wire types.
#[derive(Debug, Error)]
pub enum SerError {
    /// A CompactSize was encoded with more bytes than its value required.
    #[error("non-minimal varint encoding")]
    NonMinimalVarInt,

    /// Bubbled up from a `Read`/`Write` implementation.
    #[error(transparent)]
    IOError(#[from] IOError),

    /// A nested component failed to parse; the message names the component.
    #[error("error decoding component: {0}")]
    Component(String),
}

/// Convenience alias for serialization results.
pub type SerResult<T> = Result<T, SerError>;

/// Minimum number of bytes needed to varint-encode `number`, prefix included.
pub fn varint_len(number: u64) -> usize {
    match number {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Writes `number` as a Bitcoin-style CompactSize varint.
pub fn write_varint<W: Write>(writer: &mut W, number: u64) -> SerResult<usize> {
    Ok(match number {
        0..=0xfc => writer.write(&[number as u8])?,
        0xfd..=0xffff => {
            let mut n = writer.write(&[0xfd])?;
            n += writer.write(&(number as u16).to_le_bytes())?;
            n
        }
        0x1_0000..=0xffff_ffff => {
            let mut n = writer.write(&[0xfe])?;
            n += writer.write(&(number as u32).to_le_bytes())?;
            n
        }
        _ => {
            let mut n = writer.write(&[0xff])?;
            n += writer.write(&number.to_le_bytes())?;
            n
        }
    })
}

/// Reads a Bitcoin-style CompactSize varint, rejecting non-minimal encodings.
pub fn read_varint<R: Read>(reader: &mut R) -> SerResult<u64> {
    let mut prefix = [0u8; 1];
    reader.read_exact(&mut prefix)?;

    let number = match prefix[0] {
        0xfd => {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            u16::from_le_bytes(buf) as u64
        }
        0xfe => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            u32::from_le_bytes(buf) as u64
        }
        0xff => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            u64::from_le_bytes(buf)
        }
        b => b as u64,
    };

    if varint_len(number) != varint_len_from_prefix(prefix[0]) {
        return Err(SerError::NonMinimalVarInt);
    }

    Ok(number)
}

fn varint_len_from_prefix(prefix: u8) -> usize {
    match prefix {
        0..=0xfc => 1,
        0xfd => 3,
        0xfe => 5,
        0xff => 9,
    }
}

/// A type that can be read from and written to a plain byte stream.
///
/// Implementors get convenience little-endian integer helpers for free.
pub trait ByteFormat {
    /// Parse `Self` from `reader`.
    fn read_from<R: Read>(reader: &mut R) -> SerResult<Self>
    where
        Self: Sized;

    /// Write `Self` to `writer`, returning the number of bytes written.
    fn write_to<W: Write>(&self, writer: &mut W) -> SerResult<usize>;

    /// The exact length of `self`'s serialized form.
    fn serialized_length(&self) -> usize;

    /// Reads a little-endian `u32`.
    fn read_u32_le<R: Read>(reader: &mut R) -> SerResult<u32> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Writes a little-endian `u32`.
    fn write_u32_le<W: Write>(writer: &mut W, v: u32) -> SerResult<usize> {
        Ok(writer.write(&v.to_le_bytes())?)
    }

    /// Reads a little-endian `u64`.
    fn read_u64_le<R: Read>(reader: &mut R) -> SerResult<u64> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Writes a little-endian `u64`.
    fn write_u64_le<W: Write>(writer: &mut W, v: u64) -> SerResult<usize> {
        Ok(writer.write(&v.to_le_bytes())?)
    }

    /// Reads a little-endian `i64`.
    fn read_i64_le<R: Read>(reader: &mut R) -> SerResult<i64> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Writes a little-endian `i64`.
    fn write_i64_le<W: Write>(writer: &mut W, v: i64) -> SerResult<usize> {
        Ok(writer.write(&v.to_le_bytes())?)
    }
}

/// Reads a length-prefixed byte string (varint length, then raw bytes).
pub fn read_prefixed_bytes<R: Read>(reader: &mut R) -> SerResult<Vec<u8>> {
    let len = read_varint(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Writes a length-prefixed byte string (varint length, then raw bytes).
pub fn write_prefixed_bytes<W: Write>(writer: &mut W, data: &[u8]) -> SerResult<usize> {
    let mut n = write_varint(writer, data.len() as u64)?;
    n += writer.write(data)?;
    Ok(n)
}
