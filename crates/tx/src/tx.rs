//! The transaction, block header, and block types, with canonical
//! (de)serialization, identification hashes, and size/weight accounting
//! (§4.1.1, §4.1.2).

use std::io::{Read, Write};

use brine_core::ser::{read_varint, write_varint, ByteFormat, SerResult};
use brine_core::{hash256, H256};

use crate::error::TxError;
use crate::txio::{read_witness, witness_serialized_length, write_witness, Input, Output};

/// Convenience alias for results from `Tx`/`Block` (de)serialization, whose
/// failure modes go beyond plain wire-format errors (bad witness flag,
/// unrepresentable witness shape).
pub type TxResult<T> = Result<T, TxError>;

const WITNESS_MARKER: u8 = 0x00;
const WITNESS_FLAG: u8 = 0x01;

/// A Bitcoin transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tx {
    /// Transaction version.
    pub version: i32,
    /// Inputs.
    pub inputs: Vec<Input>,
    /// Outputs.
    pub outputs: Vec<Output>,
    /// Locktime (block height or UNIX timestamp, see [`crate::LOCKTIME_THRESHOLD`]).
    pub locktime: u32,
}

impl Tx {
    /// Whether any input carries a non-empty witness stack.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(Input::has_witness)
    }

    /// Whether this is a coinbase transaction: exactly one input, spending
    /// the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// The non-witness serialization, used both for `txid` and as the first
    /// half of the witness serialization.
    fn write_base<W: Write>(&self, writer: &mut W) -> SerResult<usize> {
        let mut n = Tx::write_i32_le(writer, self.version)?;
        n += write_varint(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            n += input.write_to(writer)?;
        }
        n += write_varint(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            n += output.write_to(writer)?;
        }
        n += Self::write_u32_le(writer, self.locktime)?;
        Ok(n)
    }

    fn write_i32_le<W: Write>(writer: &mut W, v: i32) -> SerResult<usize> {
        Ok(writer.write(&v.to_le_bytes())?)
    }

    fn read_i32_le<R: Read>(reader: &mut R) -> SerResult<i32> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// The txid: double-SHA-256 of the non-witness serialization.
    pub fn txid(&self) -> H256 {
        let mut buf = Vec::with_capacity(self.base_size());
        self.write_base(&mut buf).expect("writing to a Vec never fails");
        hash256(&buf)
    }

    /// The wtxid: equal to `txid` when witness-free, otherwise the
    /// double-SHA-256 of the full witness serialization.
    pub fn wtxid(&self) -> H256 {
        if !self.has_witness() {
            return self.txid();
        }
        let mut buf = Vec::with_capacity(self.size());
        self.write_to(&mut buf).expect("writing to a Vec never fails");
        hash256(&buf)
    }

    /// The non-witness serialized length in bytes.
    pub fn base_size(&self) -> usize {
        let mut len = 4;
        len += brine_core::ser::varint_len(self.inputs.len() as u64);
        for input in &self.inputs {
            len += input.serialized_length();
        }
        len += brine_core::ser::varint_len(self.outputs.len() as u64);
        for output in &self.outputs {
            len += output.serialized_length();
        }
        len += 4;
        len
    }

    /// `2 + Σ witness stack sizes` when any input has a witness, else `0`.
    pub fn witness_size(&self) -> usize {
        if !self.has_witness() {
            return 0;
        }
        2 + self
            .inputs
            .iter()
            .map(|i| witness_serialized_length(&i.witness))
            .sum::<usize>()
    }

    /// Full serialized length: `base_size + witness_size`.
    pub fn size(&self) -> usize {
        self.base_size() + self.witness_size()
    }

    /// `base_size * WITNESS_SCALE_FACTOR + witness_size`.
    pub fn weight(&self) -> usize {
        self.base_size() * crate::WITNESS_SCALE_FACTOR + self.witness_size()
    }

    /// `ceil(weight / 4)`.
    pub fn virtual_size(&self) -> usize {
        (self.weight() + crate::WITNESS_SCALE_FACTOR - 1) / crate::WITNESS_SCALE_FACTOR
    }

    /// `ceil(max(weight, sigops * BYTES_PER_SIGOP) / 4)`.
    pub fn sigops_size(&self, sigops: usize) -> usize {
        let scaled = std::cmp::max(self.weight(), sigops * crate::BYTES_PER_SIGOP);
        (scaled + crate::WITNESS_SCALE_FACTOR - 1) / crate::WITNESS_SCALE_FACTOR
    }
}

impl Tx {
    /// Parses a `Tx` in either the legacy or witness wire form, detected by
    /// the marker/flag pair immediately after the version (§4.1.1).
    pub fn read_from<R: Read>(reader: &mut R) -> TxResult<Self> {
        let version = Self::read_i32_le(reader)?;

        let mut count = read_varint(reader)?;
        let mut witness_present = false;
        if count == 0 {
            let mut flag = [0u8; 1];
            reader.read_exact(&mut flag)?;
            if flag[0] != WITNESS_FLAG {
                return Err(TxError::BadWitnessFlag([WITNESS_MARKER, flag[0]]));
            }
            witness_present = true;
            count = read_varint(reader)?;
        }

        let mut inputs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            inputs.push(Input::read_from(reader)?);
        }

        let out_count = read_varint(reader)?;
        let mut outputs = Vec::with_capacity(out_count as usize);
        for _ in 0..out_count {
            outputs.push(Output::read_from(reader)?);
        }

        if witness_present {
            for input in &mut inputs {
                input.witness = read_witness(reader)?;
            }
        }

        if inputs.is_empty() && !outputs.is_empty() && witness_present {
            return Err(TxError::UnrepresentableWitness);
        }

        let locktime = Self::read_u32_le(reader)?;

        Ok(Self {
            version,
            inputs,
            outputs,
            locktime,
        })
    }

    /// Writes `self` in the witness form iff any input carries a non-empty
    /// witness stack, else in the legacy form.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> TxResult<usize> {
        if !self.has_witness() {
            return Ok(self.write_base(writer)?);
        }

        if self.inputs.is_empty() && !self.outputs.is_empty() {
            return Err(TxError::UnrepresentableWitness);
        }

        let mut n = Self::write_i32_le(writer, self.version)?;
        n += writer.write(&[WITNESS_MARKER, WITNESS_FLAG])?;
        n += write_varint(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            n += input.write_to(writer)?;
        }
        n += write_varint(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            n += output.write_to(writer)?;
        }
        for input in &self.inputs {
            n += write_witness(writer, &input.witness)?;
        }
        n += Self::write_u32_le(writer, self.locktime)?;
        Ok(n)
    }
}

/// An 80-byte block header.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Header {
    /// Block version.
    pub version: i32,
    /// Hash of the previous block's header.
    pub prev_block: H256,
    /// Merkle root of the block's transactions.
    pub merkle_root: H256,
    /// Block timestamp (UNIX time).
    pub time: u32,
    /// Compact-encoded difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl Header {
    /// The block hash: double-SHA-256 of the 80-byte header.
    pub fn hash(&self) -> H256 {
        let mut buf = [0u8; 80];
        let mut cur = &mut buf[..];
        self.write_to(&mut cur).expect("writing to a fixed buffer never fails");
        hash256(&buf)
    }
}

impl ByteFormat for Header {
    fn read_from<R: Read>(reader: &mut R) -> SerResult<Self> {
        let version = Tx::read_i32_le(reader)?;
        let prev_block = H256::read_from(reader)?;
        let merkle_root = H256::read_from(reader)?;
        let time = Self::read_u32_le(reader)?;
        let bits = Self::read_u32_le(reader)?;
        let nonce = Self::read_u32_le(reader)?;
        Ok(Self {
            version,
            prev_block,
            merkle_root,
            time,
            bits,
            nonce,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> SerResult<usize> {
        let mut n = Tx::write_i32_le(writer, self.version)?;
        n += self.prev_block.write_to(writer)?;
        n += self.merkle_root.write_to(writer)?;
        n += Self::write_u32_le(writer, self.time)?;
        n += Self::write_u32_le(writer, self.bits)?;
        n += Self::write_u32_le(writer, self.nonce)?;
        Ok(n)
    }

    fn serialized_length(&self) -> usize {
        80
    }
}

/// A block: a header and its transactions.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    /// The block header.
    pub header: Header,
    /// The block's transactions, coinbase first.
    pub txs: Vec<Tx>,
}

impl Block {
    /// Parses a block: header, then varint tx count, then that many txs.
    pub fn read_from<R: Read>(reader: &mut R) -> TxResult<Self> {
        let header = Header::read_from(reader)?;
        let count = read_varint(reader)?;
        let mut txs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            txs.push(Tx::read_from(reader)?);
        }
        Ok(Self { header, txs })
    }

    /// Writes a block: header, varint tx count, then each tx.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> TxResult<usize> {
        let mut n = self.header.write_to(writer)?;
        n += write_varint(writer, self.txs.len() as u64)?;
        for tx in &self.txs {
            n += tx.write_to(writer)?;
        }
        Ok(n)
    }

    /// The exact serialized length of `self`.
    pub fn serialized_length(&self) -> usize {
        80 + brine_core::ser::varint_len(self.txs.len() as u64)
            + self.txs.iter().map(Tx::size).sum::<usize>()
    }
}
