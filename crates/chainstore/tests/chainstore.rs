//! Integration tests against a real temp directory and `lmdb` environment —
//! the scenarios from spec §8 that need actual file/KV I/O rather than pure
//! in-memory fixtures (S1 genesis bootstrap, a save/disconnect/reorg cycle,
//! reopening after a clean restart, and a crash-before-commit simulation).

use brine_chainstore::{ChainParams, ChainStore, Entry, View};
use brine_core::H256;
use brine_tx::{Coin, CoinLookup, Header, Input, Outpoint, Output, Script, Tx};

fn child_header(prev: H256, nonce: u32) -> Header {
    Header {
        version: 1,
        prev_block: prev,
        merkle_root: H256::zero(),
        time: 1_600_000_000,
        bits: 0x1d00_ffff,
        nonce,
    }
}

fn coinbase_tx(extra_nonce: u8, value: i64) -> Tx {
    Tx {
        version: 1,
        inputs: vec![Input::new(
            Outpoint::null(),
            Script::new(vec![0x01, extra_nonce]),
        )],
        outputs: vec![Output::new(value, Script::new(vec![0x51]))],
        locktime: 0,
    }
}

#[test]
fn genesis_bootstrap_matches_spec_s1() {
    let dir = tempfile::tempdir().unwrap();
    let params = ChainParams::mainnet();
    let store = ChainStore::open(dir.path(), &params).unwrap();

    assert_eq!(store.height(), 1);
    assert_eq!(store.head(), store.tail());
    let tip = store.entry(store.tail().unwrap()).unwrap();
    assert_eq!(tip.height, 0);
    assert_eq!(tip.hash(), params.genesis_header.hash());
}

#[test]
fn save_then_disconnect_restores_coin_table() {
    let dir = tempfile::tempdir().unwrap();
    let params = ChainParams::mainnet();
    let mut store = ChainStore::open(dir.path(), &params).unwrap();
    let genesis_hash = store.entry(store.tail().unwrap()).unwrap().hash();

    // Height 1: a lone coinbase that creates one spendable output.
    let cb1 = coinbase_tx(1, 50_0000_0000);
    let op1 = Outpoint::new(cb1.txid(), 0);
    let block1 = brine_tx::Block {
        header: child_header(genesis_hash, 1),
        txs: vec![cb1.clone()],
    };
    let entry1 = Entry {
        header: block1.header,
        height: 1,
        block_file: -1,
        block_pos: -1,
        undo_file: -1,
        undo_pos: -1,
    };
    let mut view1 = View::new();
    view1.put(op1, Coin::new(cb1.outputs[0].clone(), 1, true));
    store.save(entry1, &block1, Some(view1)).unwrap();

    assert_eq!(store.height(), 2);
    let mut probe = View::new();
    store.spend(&mut probe, &Tx {
        version: 1,
        inputs: vec![Input::new(op1, Script::new(vec![]))],
        outputs: vec![],
        locktime: 0,
    }).unwrap();
    assert!(probe.resolve_coin(&op1).is_some());

    // Height 2: spends op1, creates two new coins.
    let cb2 = coinbase_tx(2, 50_0000_0000);
    let spend_tx = Tx {
        version: 1,
        inputs: vec![Input::new(op1, Script::new(vec![]))],
        outputs: vec![Output::new(49_0000_0000, Script::new(vec![0x51]))],
        locktime: 0,
    };
    let op_cb2 = Outpoint::new(cb2.txid(), 0);
    let op_spend = Outpoint::new(spend_tx.txid(), 0);
    let block1_hash = entry1.hash();
    let block2 = brine_tx::Block {
        header: child_header(block1_hash, 2),
        txs: vec![cb2.clone(), spend_tx.clone()],
    };
    let entry2 = Entry {
        header: block2.header,
        height: 2,
        block_file: -1,
        block_pos: -1,
        undo_file: -1,
        undo_pos: -1,
    };
    let mut view2 = View::new();
    view2.delete(op1);
    view2.put(op_cb2, Coin::new(cb2.outputs[0].clone(), 2, true));
    view2.put(op_spend, Coin::new(spend_tx.outputs[0].clone(), 2, false));
    view2.push_undo(Coin::new(cb1.outputs[0].clone(), 1, true));
    store.save(entry2, &block2, Some(view2)).unwrap();

    assert_eq!(store.height(), 3);
    let mut probe = View::new();
    store.spend(&mut probe, &Tx {
        version: 1,
        inputs: vec![Input::new(op1, Script::new(vec![]))],
        outputs: vec![],
        locktime: 0,
    }).unwrap();
    assert!(probe.resolve_coin(&op1).is_none(), "op1 should be spent after block 2");

    // Disconnecting block 2 must invert it exactly (testable property 5).
    let undone = store.disconnect().unwrap();
    assert_eq!(store.height(), 2);
    assert_eq!(store.entry(store.tail().unwrap()).unwrap().hash(), block1_hash);
    assert!(undone.resolve_coin(&op1).is_some());

    let mut probe = View::new();
    store.spend(&mut probe, &Tx {
        version: 1,
        inputs: vec![Input::new(op1, Script::new(vec![]))],
        outputs: vec![],
        locktime: 0,
    }).unwrap();
    assert!(probe.resolve_coin(&op1).is_some(), "op1 restored after disconnect");

    let mut probe_spent = View::new();
    store.spend(&mut probe_spent, &Tx {
        version: 1,
        inputs: vec![
            Input::new(op_cb2, Script::new(vec![])),
            Input::new(op_spend, Script::new(vec![])),
        ],
        outputs: vec![],
        locktime: 0,
    }).unwrap();
    assert!(probe_spent.resolve_coin(&op_cb2).is_none());
    assert!(probe_spent.resolve_coin(&op_spend).is_none());
}

#[test]
fn reorg_onto_sibling_block_matches_spec_s4() {
    let dir = tempfile::tempdir().unwrap();
    let params = ChainParams::mainnet();
    let mut store = ChainStore::open(dir.path(), &params).unwrap();
    let genesis_hash = store.entry(store.tail().unwrap()).unwrap().hash();

    let cb_a = coinbase_tx(10, 50_0000_0000);
    let op_a0 = Outpoint::new(cb_a.txid(), 0);
    let block_a = brine_tx::Block {
        header: child_header(genesis_hash, 10),
        txs: vec![cb_a.clone()],
    };
    let entry_a = Entry {
        header: block_a.header,
        height: 1,
        block_file: -1,
        block_pos: -1,
        undo_file: -1,
        undo_pos: -1,
    };
    let mut view_a = View::new();
    view_a.put(op_a0, Coin::new(cb_a.outputs[0].clone(), 1, true));
    store.save(entry_a, &block_a, Some(view_a)).unwrap();
    let a_hash = entry_a.hash();

    // B1 spends op_a0.
    let cb_b1 = coinbase_tx(11, 50_0000_0000);
    let spend_b1 = Tx {
        version: 1,
        inputs: vec![Input::new(op_a0, Script::new(vec![]))],
        outputs: vec![Output::new(100, Script::new(vec![0x51]))],
        locktime: 0,
    };
    let block_b1 = brine_tx::Block {
        header: child_header(a_hash, 101),
        txs: vec![cb_b1.clone(), spend_b1.clone()],
    };
    let entry_b1 = Entry {
        header: block_b1.header,
        height: 2,
        block_file: -1,
        block_pos: -1,
        undo_file: -1,
        undo_pos: -1,
    };
    let mut view_b1 = View::new();
    view_b1.delete(op_a0);
    view_b1.put(Outpoint::new(cb_b1.txid(), 0), Coin::new(cb_b1.outputs[0].clone(), 2, true));
    view_b1.put(Outpoint::new(spend_b1.txid(), 0), Coin::new(spend_b1.outputs[0].clone(), 2, false));
    view_b1.push_undo(Coin::new(cb_a.outputs[0].clone(), 1, true));
    store.save(entry_b1, &block_b1, Some(view_b1)).unwrap();
    assert_eq!(store.height(), 3);

    // Reorg: disconnect B1, connect B2 (a sibling of B1 spending op_a0 differently).
    store.disconnect().unwrap();
    assert_eq!(store.entry(store.tail().unwrap()).unwrap().hash(), a_hash);

    let cb_b2 = coinbase_tx(12, 50_0000_0000);
    let spend_b2 = Tx {
        version: 1,
        inputs: vec![Input::new(op_a0, Script::new(vec![]))],
        outputs: vec![Output::new(200, Script::new(vec![0x52]))],
        locktime: 0,
    };
    let block_b2 = brine_tx::Block {
        header: child_header(a_hash, 202),
        txs: vec![cb_b2.clone(), spend_b2.clone()],
    };
    let entry_b2 = Entry {
        header: block_b2.header,
        height: 2,
        block_file: -1,
        block_pos: -1,
        undo_file: -1,
        undo_pos: -1,
    };
    let mut view_b2 = View::new();
    view_b2.delete(op_a0);
    view_b2.put(Outpoint::new(cb_b2.txid(), 0), Coin::new(cb_b2.outputs[0].clone(), 2, true));
    view_b2.put(Outpoint::new(spend_b2.txid(), 0), Coin::new(spend_b2.outputs[0].clone(), 2, false));
    view_b2.push_undo(Coin::new(cb_a.outputs[0].clone(), 1, true));
    store.save(entry_b2, &block_b2, Some(view_b2)).unwrap();

    assert_eq!(store.height(), 3);
    assert_eq!(store.entry(store.tail().unwrap()).unwrap().hash(), entry_b2.hash());

    let mut probe = View::new();
    store.spend(&mut probe, &Tx {
        version: 1,
        inputs: vec![Input::new(Outpoint::new(spend_b2.txid(), 0), Script::new(vec![]))],
        outputs: vec![],
        locktime: 0,
    }).unwrap();
    assert!(probe.resolve_coin(&Outpoint::new(spend_b2.txid(), 0)).is_some());
}

#[test]
fn reopening_yields_identical_entry_graph() {
    let dir = tempfile::tempdir().unwrap();
    let params = ChainParams::mainnet();

    let (tail_hash, height) = {
        let mut store = ChainStore::open(dir.path(), &params).unwrap();
        let genesis_hash = store.entry(store.tail().unwrap()).unwrap().hash();
        let cb = coinbase_tx(20, 25_0000_0000);
        let block = brine_tx::Block {
            header: child_header(genesis_hash, 55),
            txs: vec![cb.clone()],
        };
        let entry = Entry {
            header: block.header,
            height: 1,
            block_file: -1,
            block_pos: -1,
            undo_file: -1,
            undo_pos: -1,
        };
        let mut view = View::new();
        view.put(Outpoint::new(cb.txid(), 0), Coin::new(cb.outputs[0].clone(), 1, true));
        store.save(entry, &block, Some(view)).unwrap();
        (entry.hash(), store.height())
    };

    let reopened = ChainStore::open(dir.path(), &params).unwrap();
    assert_eq!(reopened.height(), height);
    assert_eq!(reopened.entry(reopened.tail().unwrap()).unwrap().hash(), tail_hash);
}

#[test]
fn crash_before_commit_orphans_are_truncated_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let params = ChainParams::mainnet();

    let on_disk_len_before = {
        let store = ChainStore::open(dir.path(), &params).unwrap();
        drop(store);
        std::fs::metadata(dir.path().join("blocks").join("0.dat"))
            .unwrap()
            .len()
    };

    // Simulate a crash that wrote a block payload to the active file but
    // never committed the KV transaction that would advance meta['F'].
    {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("blocks").join("0.dat"))
            .unwrap();
        f.write_all(&[0xaa; 37]).unwrap();
    }

    let reopened = ChainStore::open(dir.path(), &params).unwrap();
    assert_eq!(reopened.height(), 1);
    let on_disk_len_after = std::fs::metadata(dir.path().join("blocks").join("0.dat"))
        .unwrap()
        .len();
    assert_eq!(
        on_disk_len_after, on_disk_len_before,
        "orphaned bytes past the persisted watermark must be truncated away"
    );
}
