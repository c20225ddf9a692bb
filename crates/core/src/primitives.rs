//! The 32-byte hash type used throughout the node (block hashes, txids,
//! merkle roots).

use std::fmt;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::ser::{ByteFormat, SerResult};

/// A 32-byte double-SHA256 style digest.
///
/// Equality and ordering compare the raw bytes directly (internal
/// representation, not the reversed "block explorer" byte order used only
/// by [`H256::fmt`]).
#[derive(
    Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct H256([u8; 32]);

impl H256 {
    /// Wraps a raw 32-byte array.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the all-zero hash.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// True iff every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Borrow the raw, internal-order bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Internal-order bytes are printed little-endian, per spec: reverse
    /// for the conventional "block explorer" big-endian hex.
    pub fn to_be_hex(&self) -> String {
        let mut b = self.0;
        b.reverse();
        hex::encode(b)
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", hex::encode(self.0))
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl ByteFormat for H256 {
    fn read_from<R: Read>(reader: &mut R) -> SerResult<Self> {
        let mut buf = [0u8; 32];
        reader.read_exact(&mut buf)?;
        Ok(Self(buf))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> SerResult<usize> {
        Ok(writer.write(&self.0)?)
    }

    fn serialized_length(&self) -> usize {
        32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let h = H256::from_bytes(bytes);
        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();
        let mut cur = &buf[..];
        assert_eq!(H256::read_from(&mut cur).unwrap(), h);
    }

    #[test]
    fn null_is_zero() {
        assert!(H256::zero().is_zero());
        assert!(!H256::from_bytes([1u8; 32]).is_zero());
    }
}
