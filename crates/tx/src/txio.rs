//! The three small value types a transaction is built from: outpoints,
//! inputs, and outputs (§3).

use std::io::{Read, Write};

use brine_core::ser::{read_prefixed_bytes, write_prefixed_bytes, ByteFormat, SerResult};
use brine_core::H256;

use crate::script::Script;

/// A reference to a previous transaction's output: `(txid, index)`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Outpoint {
    /// The referenced transaction's txid.
    pub txid: H256,
    /// The index of the referenced output within that transaction.
    pub index: u32,
}

impl Outpoint {
    /// Builds an outpoint.
    pub fn new(txid: H256, index: u32) -> Self {
        Self { txid, index }
    }

    /// The null outpoint `(0x00..00, 0xffffffff)` used by a coinbase input.
    pub fn null() -> Self {
        Self {
            txid: H256::zero(),
            index: u32::MAX,
        }
    }

    /// Whether `self` is the null outpoint.
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u32::MAX
    }
}

impl ByteFormat for Outpoint {
    fn read_from<R: Read>(reader: &mut R) -> SerResult<Self> {
        let txid = H256::read_from(reader)?;
        let index = Self::read_u32_le(reader)?;
        Ok(Self { txid, index })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> SerResult<usize> {
        let mut n = self.txid.write_to(writer)?;
        n += Self::write_u32_le(writer, self.index)?;
        Ok(n)
    }

    fn serialized_length(&self) -> usize {
        36
    }
}

/// A transaction input. `witness` is always present on the in-memory type
/// (empty when the input carries no witness data); see [`Tx`](crate::Tx)'s
/// read/write for how the segwit marker/flag governs whether any witness
/// stacks are present on the wire at all.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Input {
    /// The output this input spends.
    pub prevout: Outpoint,
    /// The scriptSig.
    pub script: Script,
    /// The nSequence field.
    pub sequence: u32,
    /// The witness stack (one item per element pushed), empty if none.
    pub witness: Vec<Vec<u8>>,
}

impl Input {
    /// Builds an input with an empty witness stack and `sequence = 0xffffffff`.
    pub fn new(prevout: Outpoint, script: Script) -> Self {
        Self {
            prevout,
            script,
            sequence: 0xffff_ffff,
            witness: Vec::new(),
        }
    }

    /// Whether this input carries any witness data.
    pub fn has_witness(&self) -> bool {
        !self.witness.is_empty()
    }
}

impl ByteFormat for Input {
    fn read_from<R: Read>(reader: &mut R) -> SerResult<Self> {
        let prevout = Outpoint::read_from(reader)?;
        let script = Script::read_from(reader)?;
        let sequence = Self::read_u32_le(reader)?;
        Ok(Self {
            prevout,
            script,
            sequence,
            witness: Vec::new(),
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> SerResult<usize> {
        let mut n = self.prevout.write_to(writer)?;
        n += self.script.write_to(writer)?;
        n += Self::write_u32_le(writer, self.sequence)?;
        Ok(n)
    }

    fn serialized_length(&self) -> usize {
        self.prevout.serialized_length() + self.script.serialized_length() + 4
    }
}

/// Reads this input's witness stack (called separately from `read_from`,
/// after all inputs and outputs, per the segwit wire layout).
pub fn read_witness<R: Read>(reader: &mut R) -> SerResult<Vec<Vec<u8>>> {
    let count = brine_core::ser::read_varint(reader)?;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        items.push(read_prefixed_bytes(reader)?);
    }
    Ok(items)
}

/// Writes a witness stack in the segwit wire layout.
pub fn write_witness<W: Write>(writer: &mut W, witness: &[Vec<u8>]) -> SerResult<usize> {
    let mut n = brine_core::ser::write_varint(writer, witness.len() as u64)?;
    for item in witness {
        n += write_prefixed_bytes(writer, item)?;
    }
    Ok(n)
}

/// The serialized length of a witness stack.
pub fn witness_serialized_length(witness: &[Vec<u8>]) -> usize {
    let mut len = brine_core::ser::varint_len(witness.len() as u64);
    for item in witness {
        len += brine_core::ser::varint_len(item.len() as u64) + item.len();
    }
    len
}

/// A transaction output: an amount in satoshis and a locking script.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Output {
    /// Value in satoshis. Negative values are rejected by sanity checks, not
    /// by the type itself (mirrors the wire format, which stores a signed
    /// 64-bit integer).
    pub value: i64,
    /// The locking script (scriptPubKey).
    pub script: Script,
}

impl Output {
    /// Builds an output.
    pub fn new(value: i64, script: Script) -> Self {
        Self { value, script }
    }
}

impl ByteFormat for Output {
    fn read_from<R: Read>(reader: &mut R) -> SerResult<Self> {
        let value = Self::read_i64_le(reader)?;
        let script = Script::read_from(reader)?;
        Ok(Self { value, script })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> SerResult<usize> {
        let mut n = Self::write_i64_le(writer, self.value)?;
        n += self.script.write_to(writer)?;
        Ok(n)
    }

    fn serialized_length(&self) -> usize {
        8 + self.script.serialized_length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_outpoint_round_trips() {
        let op = Outpoint::null();
        assert!(op.is_null());
        let mut buf = Vec::new();
        op.write_to(&mut buf).unwrap();
        let mut cur = &buf[..];
        assert_eq!(Outpoint::read_from(&mut cur).unwrap(), op);
    }

    #[test]
    fn input_round_trips_without_witness() {
        let input = Input::new(Outpoint::new(H256::zero(), 0), Script::new(vec![0x51]));
        let mut buf = Vec::new();
        input.write_to(&mut buf).unwrap();
        let mut cur = &buf[..];
        let back = Input::read_from(&mut cur).unwrap();
        assert_eq!(back.prevout, input.prevout);
        assert_eq!(back.script, input.script);
        assert_eq!(back.sequence, input.sequence);
    }

    #[test]
    fn witness_round_trips() {
        let witness = vec![vec![1, 2, 3], vec![]];
        let mut buf = Vec::new();
        write_witness(&mut buf, &witness).unwrap();
        assert_eq!(buf.len(), witness_serialized_length(&witness));
        let mut cur = &buf[..];
        assert_eq!(read_witness(&mut cur).unwrap(), witness);
    }

    #[test]
    fn output_round_trips() {
        let out = Output::new(5_000_000_000, Script::new(vec![0x51]));
        let mut buf = Vec::new();
        out.write_to(&mut buf).unwrap();
        let mut cur = &buf[..];
        assert_eq!(Output::read_from(&mut cur).unwrap(), out);
    }
}
