//! The embedded block/undo storage and chain index (§4.3).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use lmdb::{Cursor, Database, DatabaseFlags, Environment, EnvironmentFlags, RwTransaction, Transaction, WriteFlags};

use brine_core::ser::{read_varint, write_varint, ByteFormat};
use brine_core::H256;
use brine_tx::{Block, Coin, CoinLookup, Header, Input, Outpoint, Output, Script, Tx};

use crate::entry::{Arena, Entry, UNWRITTEN};
use crate::error::ChainStoreError;
use crate::view::View;

/// Files roll over when the next write would cross this size.
const MAX_ACTIVE_FILE_SIZE: u64 = 512 * 1024 * 1024;

const META_WATERMARK_TAG: &[u8] = b"F";
const META_TIP_TAG: &[u8] = b"R";

/// Network parameters a [`ChainStore`] bootstraps from when its prefix is
/// empty: magic, genesis block, and the consensus constants that travel
/// with a network choice (mirrors the teacher's network-parameter struct).
#[derive(Clone, Debug)]
pub struct ChainParams {
    /// The network's message-header magic bytes.
    pub network_magic: u32,
    /// The genesis block's header.
    pub genesis_header: Header,
    /// The genesis block's sole (coinbase) transaction.
    pub genesis_coinbase: Tx,
    /// Maximum serialized (base) block size in bytes.
    pub max_block_size: usize,
    /// Confirmations required before a coinbase output is spendable.
    pub coinbase_maturity: u32,
}

impl ChainParams {
    /// Mainnet parameters: the real genesis header, a structurally valid
    /// (but not byte-identical) coinbase transaction, and the consensus
    /// constants `brine-tx` already carries.
    pub fn mainnet() -> Self {
        let merkle_root = H256::from_bytes([
            0x3b, 0xa3, 0xed, 0xfd, 0x7a, 0x7b, 0x12, 0xb2, 0x7a, 0xc7, 0x2c, 0x3e, 0x67, 0x76,
            0x8f, 0x61, 0x7f, 0xc8, 0x1b, 0xc3, 0x88, 0x8a, 0x51, 0x32, 0x3a, 0x9f, 0xb8, 0xaa,
            0x4b, 0x1e, 0x5e, 0x4a,
        ]);
        let genesis_header = Header {
            version: 1,
            prev_block: H256::zero(),
            merkle_root,
            time: 1_231_006_505,
            bits: 0x1d00_ffff,
            nonce: 2_083_236_893,
        };
        let mut pubkey = vec![0x04];
        pubkey.extend(std::iter::repeat(0u8).take(64));
        let mut script_bytes = vec![pubkey.len() as u8];
        script_bytes.extend(pubkey);
        script_bytes.push(0xac); // OP_CHECKSIG
        let genesis_coinbase = Tx {
            version: 1,
            inputs: vec![Input::new(
                Outpoint::null(),
                Script::new(vec![0x04, 0xff, 0xff, 0x00, 0x1d, 0x01, 0x04]),
            )],
            outputs: vec![Output::new(50_0000_0000, Script::new(script_bytes))],
            locktime: 0,
        };
        Self {
            network_magic: 0xd9b4_bef9,
            genesis_header,
            genesis_coinbase,
            max_block_size: brine_tx::MAX_BLOCK_SIZE,
            coinbase_maturity: brine_tx::COINBASE_MATURITY,
        }
    }
}

/// An embedded key-value environment (block/undo files plus the chain
/// index) holding everything a node needs to track the active chain and
/// its known side chains.
pub struct ChainStore {
    env: Environment,
    meta_db: Database,
    coin_db: Database,
    index_db: Database,
    tip_db: Database,

    prefix: PathBuf,
    active_file: File,
    active_file_index: i32,
    pos: i32,

    arena: Arena,
    hashes: std::collections::HashMap<H256, usize>,
    heights: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl ChainStore {
    /// Opens (creating if absent) a chain store rooted at `prefix` (§4.3.1).
    pub fn open(prefix: impl AsRef<Path>, params: &ChainParams) -> Result<Self, ChainStoreError> {
        let prefix = prefix.as_ref().to_path_buf();
        let blocks_dir = prefix.join("blocks");
        std::fs::create_dir_all(&blocks_dir)?;

        let env = Environment::new()
            .set_max_dbs(10)
            .set_flags(EnvironmentFlags::NO_TLS)
            .set_map_size(1 << 30)
            .open(&prefix)?;

        let meta_db = env.create_db(Some("meta"), DatabaseFlags::empty())?;
        let coin_db = env.create_db(Some("coin"), DatabaseFlags::empty())?;
        let index_db = env.create_db(Some("index"), DatabaseFlags::empty())?;
        let tip_db = env.create_db(Some("tip"), DatabaseFlags::empty())?;

        let (active_file_index, pos) = {
            let txn = env.begin_ro_txn()?;
            match txn.get(meta_db, &META_WATERMARK_TAG) {
                Ok(bytes) => {
                    if bytes.len() != 8 {
                        return Err(ChainStoreError::Corrupt(
                            "meta['F'] has the wrong length".into(),
                        ));
                    }
                    let file = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
                    let pos = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
                    (file, pos)
                }
                Err(lmdb::Error::NotFound) => (0, 0),
                Err(e) => return Err(e.into()),
            }
        };

        let active_path = blocks_dir.join(format!("{active_file_index}.dat"));
        let active_file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&active_path)?;
        let on_disk_len = active_file.metadata()?.len();
        if on_disk_len < pos as u64 {
            return Err(ChainStoreError::Fatal(format!(
                "active file size {on_disk_len} is smaller than the persisted watermark {pos}"
            )));
        }
        if on_disk_len > pos as u64 {
            // The block bytes were written but the KV transaction that would
            // have advanced meta['F'] never committed (crash between the
            // file write and the commit, §5). The persisted watermark is the
            // source of truth; truncate the orphaned tail so the next
            // append lands exactly at `pos` (append-mode writes always go to
            // EOF, so the file must end there too).
            tracing::warn!(
                on_disk_len,
                pos,
                "truncating orphaned bytes past the persisted watermark"
            );
            active_file.set_len(pos as u64)?;
        }

        let mut store = Self {
            env,
            meta_db,
            coin_db,
            index_db,
            tip_db,
            prefix,
            active_file,
            active_file_index,
            pos,
            arena: Arena::new(),
            hashes: std::collections::HashMap::new(),
            heights: Vec::new(),
            head: None,
            tail: None,
        };

        store.load_index()?;
        store.link_prev_pointers();

        let tip_hash = {
            let txn = store.env.begin_ro_txn()?;
            match txn.get(store.meta_db, &META_TIP_TAG) {
                Ok(bytes) => {
                    let arr: [u8; 32] = bytes.try_into().map_err(|_| {
                        ChainStoreError::Corrupt("meta['R'] has the wrong length".into())
                    })?;
                    Some(H256::from_bytes(arr))
                }
                Err(lmdb::Error::NotFound) => None,
                Err(e) => return Err(e.into()),
            }
        };

        match tip_hash {
            Some(hash) => store.link_main_chain(hash)?,
            None => {
                tracing::info!("bootstrapping chain store from genesis");
                let genesis_entry = Entry::genesis(params.genesis_header);
                let genesis_block = Block {
                    header: params.genesis_header,
                    txs: vec![params.genesis_coinbase.clone()],
                };
                store.save(genesis_entry, &genesis_block, Some(View::new()))?;
            }
        }

        Ok(store)
    }

    fn load_index(&mut self) -> Result<(), ChainStoreError> {
        let mut entries = Vec::new();
        {
            let txn = self.env.begin_ro_txn()?;
            let mut cursor = txn.open_ro_cursor(self.index_db)?;
            for item in cursor.iter() {
                let (_key, value) = item?;
                let mut cur = value;
                let entry = Entry::read_from(&mut cur)
                    .map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
                entries.push(entry);
            }
        }
        for entry in entries {
            let idx = self.arena.insert(entry, None);
            self.hashes.insert(entry.hash(), idx);
        }
        Ok(())
    }

    fn link_prev_pointers(&mut self) {
        for i in 0..self.arena.len() {
            let prev_block = self.arena.get(i).unwrap().entry.header.prev_block;
            if let Some(&prev_idx) = self.hashes.get(&prev_block) {
                self.arena.get_mut(i).unwrap().prev = Some(prev_idx);
            }
        }
    }

    fn link_main_chain(&mut self, tip_hash: H256) -> Result<(), ChainStoreError> {
        let mut chain = Vec::new();
        let mut cursor = self.hashes.get(&tip_hash).copied();
        while let Some(idx) = cursor {
            chain.push(idx);
            cursor = self.arena.get(idx).unwrap().prev;
        }
        chain.reverse();
        for window in chain.windows(2) {
            self.arena.get_mut(window[0]).unwrap().next = Some(window[1]);
        }
        self.head = chain.first().copied();
        self.tail = chain.last().copied();
        self.heights = chain;
        Ok(())
    }

    /// Connects a new tip, or persists a side-chain block with no coin/tip
    /// mutation (`view = None`) (§4.3.2).
    pub fn save(
        &mut self,
        mut entry: Entry,
        block: &Block,
        mut view: Option<View>,
    ) -> Result<(), ChainStoreError> {
        let prev_idx = self.hashes.get(&entry.header.prev_block).copied();

        if entry.block_pos == UNWRITTEN {
            let mut payload = Vec::new();
            block
                .write_to(&mut payload)
                .map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
            let sync = self.should_sync(entry.header.time, entry.height);
            let (file, pos) = self.append_record(&payload, sync)?;
            entry.block_file = file;
            entry.block_pos = pos;
        }

        if let Some(v) = view.as_mut() {
            if entry.height > 0 && !v.undo_log().is_empty() && entry.undo_pos == UNWRITTEN {
                let mut payload = Vec::new();
                write_varint(&mut payload, v.undo_log().len() as u64)
                    .map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
                for coin in v.undo_log() {
                    coin.write_to(&mut payload)
                        .map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
                }
                let sync = self.should_sync(entry.header.time, entry.height);
                let (file, pos) = self.append_record(&payload, sync)?;
                entry.undo_file = file;
                entry.undo_pos = pos;
            }
        }

        let coin_db = self.coin_db;
        let meta_db = self.meta_db;
        let index_db = self.index_db;
        let tip_db = self.tip_db;
        let active_file = self.active_file_index;
        let active_pos = self.pos;

        let mut txn = self.env.begin_rw_txn()?;
        if let Some(v) = view.as_ref() {
            if entry.height > 0 {
                put_coin_changes(&mut txn, coin_db, v)?;
            }
        }
        commit_index_and_tip(
            &mut txn,
            meta_db,
            index_db,
            tip_db,
            &entry,
            active_file,
            active_pos,
            view.is_some(),
        )?;
        txn.commit()?;

        self.link_in_memory(entry, prev_idx, view.is_some());
        Ok(())
    }

    /// Re-applies a previously-saved side-chain block during a
    /// reorganization. Skips the file writes `save` would have done — the
    /// block and (if any) undo payload are already on disk (§4.3.3).
    pub fn reconnect(&mut self, entry: Entry, view: View) -> Result<(), ChainStoreError> {
        let prev_idx = self.hashes.get(&entry.header.prev_block).copied();
        assert!(prev_idx.is_some(), "reconnect requires a previously-linked entry");

        let coin_db = self.coin_db;
        let meta_db = self.meta_db;
        let index_db = self.index_db;
        let tip_db = self.tip_db;
        let active_file = self.active_file_index;
        let active_pos = self.pos;

        let mut txn = self.env.begin_rw_txn()?;
        if entry.height > 0 {
            put_coin_changes(&mut txn, coin_db, &view)?;
        }
        commit_index_and_tip(
            &mut txn,
            meta_db,
            index_db,
            tip_db,
            &entry,
            active_file,
            active_pos,
            true,
        )?;
        txn.commit()?;

        self.link_in_memory(entry, prev_idx, true);
        Ok(())
    }

    /// Removes the current tip, restoring the coins it spent and returning
    /// the view so the caller can reapply it elsewhere (§4.3.4).
    pub fn disconnect(&mut self) -> Result<View, ChainStoreError> {
        let tail_idx = self.tail.ok_or(ChainStoreError::UnknownEntry)?;
        let entry = self.arena.get(tail_idx).ok_or(ChainStoreError::UnknownEntry)?.entry;
        let block = self.read_block(&entry)?;
        let mut undo = self.read_undo(&entry)?;

        let mut view = View::new();
        for tx in block.txs.iter().rev() {
            let is_coinbase = tx.is_coinbase();
            for input in tx.inputs.iter().rev() {
                if is_coinbase {
                    continue;
                }
                let coin = undo.pop().ok_or_else(|| {
                    ChainStoreError::Fatal("undo log exhausted before inputs".into())
                })?;
                view.put(input.prevout, coin);
            }
            for index in 0..tx.outputs.len() {
                view.delete(Outpoint::new(tx.txid(), index as u32));
            }
        }
        if !undo.is_empty() {
            return Err(ChainStoreError::Fatal(
                "undo log not fully consumed on disconnect".into(),
            ));
        }

        let coin_db = self.coin_db;
        let meta_db = self.meta_db;
        let mut txn = self.env.begin_rw_txn()?;
        put_coin_changes(&mut txn, coin_db, &view)?;
        txn.put(
            meta_db,
            &META_TIP_TAG,
            entry.header.prev_block.as_bytes(),
            WriteFlags::empty(),
        )?;
        txn.commit()?;

        let prev_idx = self.arena.get(tail_idx).and_then(|n| n.prev);
        if let Some(node) = self.arena.get_mut(tail_idx) {
            node.next = None;
        }
        self.heights.pop();
        self.tail = prev_idx;

        Ok(view)
    }

    /// Resolves every input of `tx` not already known to `view` from the
    /// coin table. Missing coins are not an error here (§4.3.5).
    pub fn spend(&self, view: &mut View, tx: &Tx) -> Result<(), ChainStoreError> {
        let txn = self.env.begin_ro_txn()?;
        for input in &tx.inputs {
            if input.prevout.is_null() || view.resolve_coin(&input.prevout).is_some() {
                continue;
            }
            let mut key = Vec::new();
            input
                .prevout
                .write_to(&mut key)
                .map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
            match txn.get(self.coin_db, &key) {
                Ok(bytes) => {
                    let mut cur = bytes;
                    let coin = Coin::read_from(&mut cur)
                        .map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
                    view.put(input.prevout, coin);
                }
                Err(lmdb::Error::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Reads back the block stored at `entry`.
    pub fn read_block(&self, entry: &Entry) -> Result<Block, ChainStoreError> {
        let payload = self.read_record(entry.block_file, entry.block_pos)?;
        let mut cur = &payload[..];
        Block::read_from(&mut cur).map_err(|e| ChainStoreError::Corrupt(e.to_string()))
    }

    /// Reads back the undo log stored at `entry`, or an empty log if none
    /// was ever written.
    pub fn read_undo(&self, entry: &Entry) -> Result<Vec<Coin>, ChainStoreError> {
        if entry.undo_pos == UNWRITTEN {
            return Ok(Vec::new());
        }
        let payload = self.read_record(entry.undo_file, entry.undo_pos)?;
        let mut cur = &payload[..];
        let count = read_varint(&mut cur).map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
        let mut coins = Vec::with_capacity(count as usize);
        for _ in 0..count {
            coins.push(Coin::read_from(&mut cur).map_err(|e| ChainStoreError::Corrupt(e.to_string()))?);
        }
        Ok(coins)
    }

    fn read_record(&self, file: i32, pos: i32) -> Result<Vec<u8>, ChainStoreError> {
        let path = self.prefix.join("blocks").join(format!("{file}.dat"));
        let mut f = File::open(path)?;
        f.seek(SeekFrom::Start(pos as u64))?;
        let mut len_buf = [0u8; 4];
        f.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn append_record(&mut self, payload: &[u8], sync: bool) -> Result<(i32, i32), ChainStoreError> {
        let total_len = 4u64 + payload.len() as u64;
        if self.pos as u64 + total_len > MAX_ACTIVE_FILE_SIZE {
            self.rotate_active_file()?;
        }
        let record_pos = self.pos;
        self.active_file.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.active_file.write_all(payload)?;
        self.active_file.flush()?;
        if sync {
            self.active_file.sync_all()?;
        }
        self.pos += total_len as i32;
        Ok((self.active_file_index, record_pos))
    }

    fn rotate_active_file(&mut self) -> Result<(), ChainStoreError> {
        self.active_file.sync_all()?;
        self.active_file_index += 1;
        self.pos = 0;
        let path = self
            .prefix
            .join("blocks")
            .join(format!("{}.dat", self.active_file_index));
        self.active_file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Ok(())
    }

    /// Whether a block at `(block_time, height)` should be fsynced as it is
    /// written, bounding the worst-case re-scan on crash (§4.3.7).
    pub fn should_sync(&self, block_time: u32, height: u32) -> bool {
        if height % 1000 == 0 {
            return true;
        }
        let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(_) => return true,
        };
        let block_time = block_time as i64;
        if block_time > now {
            return true;
        }
        now - block_time <= 24 * 3600
    }

    fn link_in_memory(&mut self, entry: Entry, prev_idx: Option<usize>, is_main_chain: bool) {
        let idx = self.arena.insert(entry, prev_idx);
        self.hashes.insert(entry.hash(), idx);
        if is_main_chain {
            if let Some(p) = prev_idx {
                if let Some(node) = self.arena.get_mut(p) {
                    node.next = Some(idx);
                }
            }
            debug_assert_eq!(self.heights.len(), entry.height as usize);
            self.heights.push(idx);
            self.tail = Some(idx);
            if self.head.is_none() {
                self.head = Some(idx);
            }
        }
    }

    /// The arena index of the current tip, if any block has been saved.
    pub fn tail(&self) -> Option<usize> {
        self.tail
    }

    /// The arena index of the genesis entry, if any block has been saved.
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    /// Number of blocks on the active chain.
    pub fn height(&self) -> usize {
        self.heights.len()
    }

    /// Looks up an entry by its arena index.
    pub fn entry(&self, index: usize) -> Option<Entry> {
        self.arena.get(index).map(|n| n.entry)
    }

    /// Looks up an entry by block hash.
    pub fn entry_by_hash(&self, hash: &H256) -> Option<Entry> {
        self.hashes.get(hash).and_then(|&idx| self.entry(idx))
    }

    /// Always succeeds; this store performs no file compaction
    /// (mirrors the original's `prune_block`, which never fails either).
    pub fn prune_block(&self, _entry: &Entry) -> Result<(), ChainStoreError> {
        Ok(())
    }
}

fn put_coin_changes(
    txn: &mut RwTransaction,
    coin_db: Database,
    view: &View,
) -> Result<(), ChainStoreError> {
    for (outpoint, coin) in view.puts() {
        let mut key = Vec::new();
        outpoint
            .write_to(&mut key)
            .map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
        let mut val = Vec::new();
        coin.write_to(&mut val)
            .map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
        txn.put(coin_db, &key, &val, WriteFlags::empty())?;
    }
    for outpoint in view.deletes() {
        let mut key = Vec::new();
        outpoint
            .write_to(&mut key)
            .map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
        match txn.del(coin_db, &key, None) {
            Ok(()) => {}
            Err(lmdb::Error::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn commit_index_and_tip(
    txn: &mut RwTransaction,
    meta_db: Database,
    index_db: Database,
    tip_db: Database,
    entry: &Entry,
    active_file: i32,
    active_pos: i32,
    set_tip: bool,
) -> Result<(), ChainStoreError> {
    let mut fpos = Vec::with_capacity(8);
    fpos.extend_from_slice(&active_file.to_le_bytes());
    fpos.extend_from_slice(&active_pos.to_le_bytes());
    txn.put(meta_db, &META_WATERMARK_TAG, &fpos, WriteFlags::empty())?;

    let mut entry_buf = Vec::new();
    entry
        .write_to(&mut entry_buf)
        .map_err(|e| ChainStoreError::Corrupt(e.to_string()))?;
    txn.put(index_db, entry.hash().as_bytes(), &entry_buf, WriteFlags::empty())?;

    if entry.height > 0 {
        match txn.del(tip_db, entry.header.prev_block.as_bytes(), None) {
            Ok(()) => {}
            Err(lmdb::Error::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }
    txn.put(tip_db, entry.hash().as_bytes(), &[1u8], WriteFlags::empty())?;

    if set_tip {
        txn.put(meta_db, &META_TIP_TAG, entry.hash().as_bytes(), WriteFlags::empty())?;
    }
    Ok(())
}
