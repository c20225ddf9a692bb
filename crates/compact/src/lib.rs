//! BIP-152 compact blocks: short-ID derivation, the sender-side builder, and
//! the receiver-side setup/fill/finalize state machine (§4.2).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

use std::collections::HashMap;
use std::io::{Read, Write};

use brine_core::ser::{read_varint, write_varint, ByteFormat, SerResult};
use brine_core::{sha256, siphash24, H256};
use brine_tx::{Block, Header, Tx, TxError, MAX_BLOCK_SIZE};
use thiserror::Error;

/// Errors from building or reconstructing a compact block.
#[derive(Debug, Error)]
pub enum CompactError {
    /// The peer's message violated the wire-format or anti-hashdos bounds
    /// (§4.2.3/§4.2.4). Distinct from a SipHash collision: a peer sending
    /// this should be treated with suspicion.
    #[error("malformed compact block: {0}")]
    Malformed(&'static str),

    /// Two distinct transactions hashed to the same 48-bit short ID under
    /// this block's key. Not a protocol violation — re-request the full
    /// block instead (§4.2.3, S3).
    #[error("short-id collision")]
    SiphashCollision,

    /// A `BlockTxn` response supplied fewer transactions than were missing.
    #[error("incomplete BlockTxn response")]
    Incomplete,

    /// Bubbled up from parsing a transaction in the message.
    #[error(transparent)]
    Tx(#[from] TxError),
}

/// A transaction prefilled into the compact block message, carrying its
/// differentially-encoded absolute position rather than an absolute index
/// (§9 "Transient `_index` on Tx"); the field never leaks into [`Tx`]
/// itself.
#[derive(Clone, Debug)]
pub struct PrefilledTx {
    /// Wire-level delta: `position - previous_position - 1`. The first
    /// prefilled tx's delta is its absolute position.
    pub delta: u64,
    /// The transaction itself, always carried in full (witness form if it
    /// has one).
    pub tx: Tx,
}

/// The `cmpctblock` message: header, key nonce, short-IDs for the txs the
/// sender expects the receiver already has, and a sparse set of prefilled
/// txs (§4.2, wire format in §6).
#[derive(Clone, Debug)]
pub struct CompactBlock {
    /// The block header.
    pub header: Header,
    /// Per-block SipHash key material (combined with the header to derive
    /// the actual 16-byte sipkey).
    pub key_nonce: u64,
    /// 48-bit short IDs, one per non-prefilled transaction, in block order.
    pub ids: Vec<u64>,
    /// Transactions sent in full (always includes the coinbase).
    pub prefilled: Vec<PrefilledTx>,
}

/// `getblocktxn`: names the still-missing positions by block hash.
#[derive(Clone, Debug)]
pub struct GetBlockTxn {
    /// The block being reconstructed.
    pub block_hash: H256,
    /// Absolute positions (0-based, within the full tx list) requested.
    pub indexes: Vec<usize>,
}

/// `blocktxn`: the literal missing transactions, in the order requested.
#[derive(Clone, Debug)]
pub struct BlockTxn {
    /// The block being reconstructed.
    pub block_hash: H256,
    /// Transactions, in the same order as the `GetBlockTxn.indexes` that
    /// requested them.
    pub txs: Vec<Tx>,
}

/// Derives the 16-byte SipHash key for a block: `SHA-256(header || key_nonce
/// as little-endian u64)`, truncated to its first 16 bytes (§4.2.1).
pub fn derive_sipkey(header: &Header, key_nonce: u64) -> [u8; 16] {
    let mut buf = Vec::with_capacity(88);
    header.write_to(&mut buf).expect("writing to a Vec never fails");
    buf.extend_from_slice(&key_nonce.to_le_bytes());
    let digest = sha256(&buf);
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

/// The 48-bit short ID of a (w)txid under `sipkey` (§4.2.1).
pub fn short_id(sipkey: &[u8; 16], hash: &H256) -> u64 {
    siphash24(sipkey, hash.as_bytes()) & 0x0000_ffff_ffff_ffff
}

/// Chooses a `key_nonce` uniformly at random, for callers that don't want to
/// manage their own RNG before calling [`build_compact_block`] (§4.2.2).
pub fn random_key_nonce() -> u64 {
    rand::random()
}

/// Builds a `CompactBlock` from a full block (§4.2.2). `key_nonce` should be
/// chosen uniformly at random by the caller (e.g. via [`random_key_nonce`]);
/// it is threaded through explicitly so this function stays a pure,
/// swap-in-any-RNG transform.
pub fn build_compact_block(block: &Block, key_nonce: u64) -> CompactBlock {
    let sipkey = derive_sipkey(&block.header, key_nonce);

    let mut txs = block.txs.iter();
    let coinbase = txs.next().cloned().unwrap_or_default();

    let ids = txs.map(|tx| short_id(&sipkey, &tx.wtxid())).collect();

    CompactBlock {
        header: block.header,
        key_nonce,
        ids,
        prefilled: vec![PrefilledTx {
            delta: 0,
            tx: coinbase,
        }],
    }
}

/// Receiver-side reconstruction state for one in-flight compact block
/// (§4.2.3–§4.2.5).
pub struct Reconstruction {
    header: Header,
    sipkey: [u8; 16],
    avail: Vec<Option<Tx>>,
    id_map: HashMap<u64, usize>,
}

impl Reconstruction {
    /// Runs the receiver's `setup` step (§4.2.3): validates anti-hashdos
    /// bounds, places prefilled txs at their absolute positions, and maps
    /// each remaining short ID to the position it claims. A duplicate short
    /// ID is reported as [`CompactError::SiphashCollision`], distinct from
    /// any other malformed-input rejection.
    pub fn setup(cmpct: &CompactBlock) -> Result<Self, CompactError> {
        let total = cmpct.prefilled.len() + cmpct.ids.len();
        if total == 0 {
            tracing::debug!("rejecting compact block: no transactions at all");
            return Err(CompactError::Malformed("empty compact block"));
        }
        if total > MAX_BLOCK_SIZE / 10 {
            tracing::debug!(total, "rejecting compact block: tx count exceeds bound");
            return Err(CompactError::Malformed("total tx count exceeds bound"));
        }
        if total > (MAX_BLOCK_SIZE - 81) / 60 {
            tracing::debug!(total, "rejecting compact block: anti-hashdos bound exceeded");
            return Err(CompactError::Malformed("total tx count exceeds anti-hashdos bound"));
        }

        let mut avail: Vec<Option<Tx>> = vec![None; total];

        let mut last: i64 = -1;
        for (i, prefilled) in cmpct.prefilled.iter().enumerate() {
            last += prefilled.delta as i64 + 1;
            if last < 0 || last > 0xffff || (last as usize) >= cmpct.ids.len() + i {
                return Err(CompactError::Malformed("prefilled position out of range"));
            }
            avail[last as usize] = Some(prefilled.tx.clone());
        }

        let sipkey = derive_sipkey(&cmpct.header, cmpct.key_nonce);
        let mut id_map = HashMap::with_capacity(cmpct.ids.len());
        let mut pos = 0usize;
        for &id in &cmpct.ids {
            while avail[pos].is_some() {
                pos += 1;
            }
            if id_map.insert(id, pos).is_some() {
                tracing::debug!(id, "short-id collision during compact block setup");
                return Err(CompactError::SiphashCollision);
            }
            pos += 1;
        }

        Ok(Self {
            header: cmpct.header,
            sipkey,
            avail,
            id_map,
        })
    }

    /// This reconstruction's derived sipkey, for matching local mempool txs
    /// against `id_map` without a round-trip.
    pub fn sipkey(&self) -> &[u8; 16] {
        &self.sipkey
    }

    /// If `tx`'s short ID under this block's key matches a still-unresolved
    /// position, fills it directly (the "peer may populate avail[] from its
    /// mempool" path in §4.2.5) and returns that position.
    pub fn try_fill_from_known_tx(&mut self, tx: &Tx) -> Option<usize> {
        let id = short_id(&self.sipkey, &tx.wtxid());
        let pos = *self.id_map.get(&id)?;
        if self.avail[pos].is_none() {
            self.avail[pos] = Some(tx.clone());
        }
        Some(pos)
    }

    /// Whether every position has been resolved.
    pub fn is_complete(&self) -> bool {
        self.avail.iter().all(Option::is_some)
    }

    /// Builds the `GetBlockTxn` request naming every still-unresolved
    /// position (§4.2.4).
    pub fn build_request(&self, block_hash: H256) -> GetBlockTxn {
        let indexes = self
            .avail
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.is_none().then_some(i))
            .collect();
        GetBlockTxn {
            block_hash,
            indexes,
        }
    }

    /// Fills the still-missing positions, left to right, from a `BlockTxn`
    /// response whose txs are in request order (§4.2.5).
    pub fn fill_missing(&mut self, txs: Vec<Tx>) -> Result<(), CompactError> {
        let missing: Vec<usize> = self
            .avail
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.is_none().then_some(i))
            .collect();

        if txs.len() < missing.len() {
            return Err(CompactError::Incomplete);
        }
        if txs.len() > missing.len() {
            return Err(CompactError::Malformed("BlockTxn carried more txs than were missing"));
        }

        for (pos, tx) in missing.into_iter().zip(txs) {
            self.avail[pos] = Some(tx);
        }
        Ok(())
    }

    /// Transfers ownership of the resolved transactions into a full block
    /// (§4.2.5). Fails if any position is still unresolved.
    pub fn finalize(self) -> Result<Block, CompactError> {
        if !self.is_complete() {
            return Err(CompactError::Incomplete);
        }
        let txs = self.avail.into_iter().map(|t| t.expect("checked complete")).collect();
        Ok(Block {
            header: self.header,
            txs,
        })
    }
}

impl CompactBlock {
    /// Parses a `cmpctblock` message.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, CompactError> {
        let header = Header::read_from(reader).map_err(TxError::from)?;
        let key_nonce = read_u64_le(reader).map_err(TxError::from)?;

        let id_count = read_varint(reader).map_err(TxError::from)?;
        let mut ids = Vec::with_capacity(id_count as usize);
        for _ in 0..id_count {
            let mut buf = [0u8; 6];
            reader.read_exact(&mut buf).map_err(|e| TxError::from(brine_core::SerError::from(e)))?;
            let lo = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as u64;
            let hi = u16::from_le_bytes(buf[4..6].try_into().unwrap()) as u64;
            ids.push(lo | (hi << 32));
        }

        let prefilled_count = read_varint(reader).map_err(TxError::from)?;
        let mut prefilled = Vec::with_capacity(prefilled_count as usize);
        for _ in 0..prefilled_count {
            let delta = read_varint(reader).map_err(TxError::from)?;
            let tx = Tx::read_from(reader)?;
            prefilled.push(PrefilledTx { delta, tx });
        }

        Ok(Self {
            header,
            key_nonce,
            ids,
            prefilled,
        })
    }

    /// Writes a `cmpctblock` message.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<usize, CompactError> {
        let mut n = self.header.write_to(writer).map_err(TxError::from)?;
        n += write_u64_le(writer, self.key_nonce).map_err(TxError::from)?;

        n += write_varint(writer, self.ids.len() as u64).map_err(TxError::from)?;
        for &id in &self.ids {
            let lo = (id & 0xffff_ffff) as u32;
            let hi = ((id >> 32) & 0xffff) as u16;
            n += writer.write(&lo.to_le_bytes()).map_err(|e| TxError::from(brine_core::SerError::from(e)))?;
            n += writer.write(&hi.to_le_bytes()).map_err(|e| TxError::from(brine_core::SerError::from(e)))?;
        }

        n += write_varint(writer, self.prefilled.len() as u64).map_err(TxError::from)?;
        for p in &self.prefilled {
            n += write_varint(writer, p.delta).map_err(TxError::from)?;
            n += p.tx.write_to(writer)?;
        }

        Ok(n)
    }
}

impl GetBlockTxn {
    /// Parses a `getblocktxn` message, decoding the differentially-encoded
    /// index list. An absolute index exceeding `0xffff` is a parse error.
    pub fn read_from<R: Read>(reader: &mut R) -> SerResult<Self> {
        let block_hash = H256::read_from(reader)?;
        let count = read_varint(reader)?;
        let mut indexes = Vec::with_capacity(count as usize);
        let mut running: i64 = -1;
        for _ in 0..count {
            let delta = read_varint(reader)?;
            running += delta as i64 + 1;
            if running < 0 || running > 0xffff {
                return Err(brine_core::SerError::Component("getblocktxn index out of range".into()));
            }
            indexes.push(running as usize);
        }
        Ok(Self {
            block_hash,
            indexes,
        })
    }

    /// Writes a `getblocktxn` message with differentially-encoded indexes:
    /// the first value is written raw, each subsequent value as
    /// `absolute - previous - 1` (§4.2.4).
    pub fn write_to<W: Write>(&self, writer: &mut W) -> SerResult<usize> {
        let mut n = self.block_hash.write_to(writer)?;
        n += write_varint(writer, self.indexes.len() as u64)?;
        let mut prev: i64 = -1;
        for &index in &self.indexes {
            let delta = index as i64 - prev - 1;
            n += write_varint(writer, delta as u64)?;
            prev = index as i64;
        }
        Ok(n)
    }
}

impl BlockTxn {
    /// Parses a `blocktxn` message.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, CompactError> {
        let block_hash = H256::read_from(reader).map_err(TxError::from)?;
        let count = read_varint(reader).map_err(TxError::from)?;
        let mut txs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            txs.push(Tx::read_from(reader)?);
        }
        Ok(Self { block_hash, txs })
    }

    /// Writes a `blocktxn` message.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<usize, CompactError> {
        let mut n = self.block_hash.write_to(writer).map_err(TxError::from)?;
        n += write_varint(writer, self.txs.len() as u64).map_err(TxError::from)?;
        for tx in &self.txs {
            n += tx.write_to(writer)?;
        }
        Ok(n)
    }
}

fn read_u64_le<R: Read>(reader: &mut R) -> SerResult<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_u64_le<W: Write>(writer: &mut W, v: u64) -> SerResult<usize> {
    Ok(writer.write(&v.to_le_bytes())?)
}
