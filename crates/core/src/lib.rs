//! Shared wire-format primitives and cryptography for the `brine` node crates.
//!
//! This crate plays the role of the "codec library" and "crypto library"
//! that the rest of the node treats as pre-existing collaborators: a small
//! [`ByteFormat`](ser::ByteFormat) trait over `Read`/`Write`, a 32-byte
//! [`H256`](primitives::H256) hash type, and thin wrappers around the hash
//! and signature primitives consensus code needs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod ecdsa;
pub mod hashes;
pub mod primitives;
pub mod ser;

pub use hashes::{hash160, hash256, ripemd160, sha256, siphash24};
pub use primitives::H256;
pub use ser::{ByteFormat, SerError, SerResult};
