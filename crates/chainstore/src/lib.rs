//! ChainStore: durable state for the block DAG and UTXO set — a
//! transactional index of block headers and metadata, a UTXO table keyed by
//! outpoint, a tip pointer, and append-only block/undo files behind a
//! rotating file cursor. `save`/`reconnect`/`disconnect` each commit under a
//! single `lmdb` transaction that stays crash-consistent with the file
//! writes that precede it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod entry;
pub mod error;
pub mod store;
pub mod view;

pub use entry::{Arena, Entry, Node, UNWRITTEN};
pub use error::ChainStoreError;
pub use store::{ChainParams, ChainStore};
pub use view::View;
