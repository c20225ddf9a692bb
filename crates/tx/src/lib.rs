//! TxEngine: pure functions over Bitcoin transactions — identification
//! hashes, canonical (de)serialization, sanity and input checks, sighashing
//! (legacy and segwit), signing of the common script templates, and
//! sigop/weight accounting.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod coin;
pub mod error;
pub mod sanity;
pub mod script;
pub mod sighash;
pub mod sign;
pub mod tx;
pub mod txio;

pub use coin::{Coin, CoinLookup};
pub use error::TxError;
pub use sanity::{check_inputs, check_sanity, is_final, is_rbf, verify_locktime, verify_sequence, ConsensusReject};
pub use script::{Script, ScriptType};
pub use sighash::{sighash_v0, sighash_v1, Sighash, SighashCache};
pub use sign::{sign_input, verify_input, VerifyFlags, STANDARD_FLAGS};
pub use tx::{Block, Header, Tx, TxResult};
pub use txio::{Input, Outpoint, Output};

/// Maximum value of any single output, and of any total, in satoshis.
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// Maximum serialized block size in bytes (base, non-witness).
pub const MAX_BLOCK_SIZE: usize = 4_000_000;

/// Number of confirmations a coinbase output must have before it is spendable.
pub const COINBASE_MATURITY: u32 = 100;

/// Weight units per byte of non-witness data (BIP141).
pub const WITNESS_SCALE_FACTOR: usize = 4;

/// Bytes charged per legacy sigop when computing `sigops_size`.
pub const BYTES_PER_SIGOP: usize = 20;

/// Locktime values below this are interpreted as block heights; at or above,
/// as UNIX timestamps.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// `nSequence` flag (bit 31) that disables the relative-locktime check.
pub const SEQUENCE_DISABLE_FLAG: u32 = 1 << 31;

/// `nSequence` flag (bit 22) selecting time-based (vs. block-based) relative
/// locktime.
pub const SEQUENCE_TYPE_FLAG: u32 = 1 << 22;

/// Mask over the low 16 bits of `nSequence` carrying the relative locktime
/// value.
pub const SEQUENCE_MASK: u32 = 0x0000_ffff;
