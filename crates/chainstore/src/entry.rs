//! A block index record and the arena that holds the Entry graph (§4.3,
//! §9 "Cyclic Entry graph").

use brine_core::ser::{ByteFormat, SerResult};
use brine_core::H256;
use brine_tx::Header;
use std::io::{Read, Write};

/// A sentinel `(file, pos)` meaning "not yet written".
pub const UNWRITTEN: i32 = -1;

/// One block's index record: its header plus where its block/undo payload
/// lives on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    /// This entry's header (its hash is `header.hash()`).
    pub header: Header,
    /// Height on the chain this entry belongs to.
    pub height: u32,
    /// Active file index the block payload was written to, or [`UNWRITTEN`].
    pub block_file: i32,
    /// Byte offset of the block payload's length-prefixed record.
    pub block_pos: i32,
    /// Active file index the undo payload was written to, or [`UNWRITTEN`].
    pub undo_file: i32,
    /// Byte offset of the undo payload's length-prefixed record.
    pub undo_pos: i32,
}

impl Entry {
    /// This entry's block hash.
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    /// Builds the genesis entry: height 0, nothing written yet.
    pub fn genesis(header: Header) -> Self {
        Self {
            header,
            height: 0,
            block_file: UNWRITTEN,
            block_pos: UNWRITTEN,
            undo_file: UNWRITTEN,
            undo_pos: UNWRITTEN,
        }
    }
}

fn read_i32_le<R: Read>(reader: &mut R) -> SerResult<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn write_i32_le<W: Write>(writer: &mut W, v: i32) -> SerResult<usize> {
    writer.write_all(&v.to_le_bytes())?;
    Ok(4)
}

impl ByteFormat for Entry {
    fn read_from<R: Read>(reader: &mut R) -> SerResult<Self> {
        let header = Header::read_from(reader)?;
        let height = Self::read_u32_le(reader)?;
        let block_file = read_i32_le(reader)?;
        let block_pos = read_i32_le(reader)?;
        let undo_file = read_i32_le(reader)?;
        let undo_pos = read_i32_le(reader)?;
        Ok(Self {
            header,
            height,
            block_file,
            block_pos,
            undo_file,
            undo_pos,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> SerResult<usize> {
        let mut n = self.header.write_to(writer)?;
        n += Self::write_u32_le(writer, self.height)?;
        n += write_i32_le(writer, self.block_file)?;
        n += write_i32_le(writer, self.block_pos)?;
        n += write_i32_le(writer, self.undo_file)?;
        n += write_i32_le(writer, self.undo_pos)?;
        Ok(n)
    }

    fn serialized_length(&self) -> usize {
        80 + 4 + 4 * 4
    }
}

/// One arena slot: an [`Entry`] plus its links in the Entry graph. Indices,
/// not reference-counted pointers — avoids cycles without `Rc`/`RefCell`
/// (§9).
#[derive(Clone, Copy, Debug)]
pub struct Node {
    /// The entry itself.
    pub entry: Entry,
    /// The previous block on this entry's chain, if any (`None` at genesis).
    pub prev: Option<usize>,
    /// The next block on the main chain through this entry, if known.
    pub next: Option<usize>,
}

/// An append-only arena of [`Node`]s, indexed by a stable `usize` id.
#[derive(Clone, Debug, Default)]
pub struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    /// Builds an empty arena.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Inserts a node, returning its stable index.
    pub fn insert(&mut self, entry: Entry, prev: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node {
            entry,
            prev,
            next: None,
        });
        index
    }

    /// Borrows a node.
    pub fn get(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Mutably borrows a node.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    /// Total number of nodes ever inserted (the arena never shrinks; a
    /// disconnected tip's node stays allocated, just unlinked from
    /// `heights`).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
