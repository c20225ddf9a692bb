//! Error kinds for the chain index and block/undo storage (§7).

use thiserror::Error;

/// Failures from opening or mutating a [`crate::ChainStore`].
#[derive(Debug, Error)]
pub enum ChainStoreError {
    /// The embedded KV environment rejected an operation.
    #[error(transparent)]
    Lmdb(#[from] lmdb::Error),

    /// A filesystem operation on the append-only block/undo files failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A stored record failed to parse back into its in-memory type.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// A caller referenced an `Entry` this store has never seen.
    #[error("unknown block hash")]
    UnknownEntry,

    /// An invariant that must always hold was violated — a bug, not a
    /// recoverable condition. The process should abort rather than
    /// continue with inconsistent state (§7 `Fatal`).
    #[error("fatal invariant violation: {0}")]
    Fatal(String),
}
