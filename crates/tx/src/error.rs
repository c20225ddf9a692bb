//! Error types for transaction (de)serialization, sighashing, and signing.

use brine_core::SerError;
use thiserror::Error;

/// Errors from parsing, sighashing, or signing a transaction.
#[derive(Debug, Error)]
pub enum TxError {
    /// Bubbled up from the wire-format layer.
    #[error(transparent)]
    Ser(#[from] SerError),

    /// SIGHASH_NONE (and SIGHASH_NONE|ANYONECANPAY) are rejected outright.
    #[error("SIGHASH_NONE is unsupported")]
    NoneUnsupported,

    /// SIGHASH_SINGLE with no output at the signed input's index.
    ///
    /// Historically Bitcoin Core signs the fixed digest
    /// `0x01 || 0x00 * 31` in this case (the "SIGHASH_SINGLE bug"); `brine`
    /// preserves that digest in `sighash_v0` but refuses to *sign* it.
    #[error("SIGHASH_SINGLE bug: no output at index {0}")]
    SighashSingleBug(usize),

    /// An unrecognized sighash type byte.
    #[error("unknown sighash type: {0:#x}")]
    UnknownSighash(u8),

    /// The segwit marker/flag pair after the version was present but was
    /// not exactly `0x00 0x01`.
    #[error("bad witness marker/flag: {0:?}")]
    BadWitnessFlag([u8; 2]),

    /// A witness-free tx with zero inputs but nonzero outputs cannot be
    /// round-tripped through the witness-form marker without becoming
    /// ambiguous with an empty-witness-stack encoding; rejected.
    #[error("transaction with 0 inputs and >0 outputs is unrepresentable")]
    UnrepresentableWitness,

    /// `sign_input` was asked to sign a `prevout_script` shape it does not
    /// recognize.
    #[error("unsupported script template for signing")]
    UnsupportedScript,

    /// The input index passed to a per-input operation is out of range.
    #[error("input index {0} out of range")]
    InputIndexOutOfRange(usize),

    /// The private key or a derived signature was rejected by `secp256k1`.
    #[error(transparent)]
    Ecdsa(#[from] brine_core::ecdsa::EcdsaError),
}
