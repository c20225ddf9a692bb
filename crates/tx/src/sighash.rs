//! Sighash computation for both script versions: legacy (§4.1.3, BIP-unnamed
//! original scheme) and segwit v0 (§4.1.4, BIP143).

use brine_core::ser::ByteFormat;
use brine_core::{hash256, H256};

use crate::error::TxError;
use crate::script::Script;
use crate::tx::Tx;
use crate::txio::Outpoint;

/// The SIGHASH_SINGLE bug digest: a fixed 32-byte value Bitcoin Core signs
/// when a legacy SIGHASH_SINGLE is requested for an input with no
/// corresponding output (§4.1.3 step 1, testable property 7).
pub const SIGHASH_SINGLE_BUG_DIGEST: H256 = H256::from_bytes([
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
]);

/// A sighash type byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Sighash {
    /// Sign all inputs and all outputs.
    All = 0x01,
    /// Sign all inputs, no outputs. Unsupported by `brine`'s signer.
    None = 0x02,
    /// Sign all inputs, only the output at the same index as this input.
    Single = 0x03,
    /// `All`, plus only this input is committed to.
    AllAnyoneCanPay = 0x81,
    /// `None`, plus only this input is committed to.
    NoneAnyoneCanPay = 0x82,
    /// `Single`, plus only this input is committed to.
    SingleAnyoneCanPay = 0x83,
}

impl Sighash {
    /// Parses a sighash type byte.
    pub fn from_u8(v: u8) -> Result<Self, TxError> {
        Ok(match v {
            0x01 => Sighash::All,
            0x02 => Sighash::None,
            0x03 => Sighash::Single,
            0x81 => Sighash::AllAnyoneCanPay,
            0x82 => Sighash::NoneAnyoneCanPay,
            0x83 => Sighash::SingleAnyoneCanPay,
            other => return Err(TxError::UnknownSighash(other)),
        })
    }

    /// The raw byte value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The base type (`ALL`/`NONE`/`SINGLE`) with the ANYONECANPAY bit masked off.
    pub fn base(self) -> u8 {
        self.as_u8() & 0x1f
    }

    /// Whether the ANYONECANPAY bit is set.
    pub fn anyone_can_pay(self) -> bool {
        self.as_u8() & 0x80 != 0
    }

    fn is_none(self) -> bool {
        self.base() == Sighash::None as u8
    }

    fn is_single(self) -> bool {
        self.base() == Sighash::Single as u8
    }
}

/// Whether `sighash_v0(tx, i, _, sighash_type)` would return the
/// fixed SIGHASH_SINGLE-bug digest rather than a real commitment — `brine`
/// preserves the digest for compatibility but refuses to ever *sign* it
/// (§4.1.5).
pub fn is_single_bug(tx: &Tx, input_index: usize, sighash_type: Sighash) -> bool {
    sighash_type.is_single() && input_index >= tx.outputs.len()
}

/// Legacy (pre-segwit) sighash (§4.1.3).
pub fn sighash_v0(tx: &Tx, input_index: usize, prev_script: &Script, sighash_type: Sighash) -> H256 {
    if is_single_bug(tx, input_index, sighash_type) {
        return SIGHASH_SINGLE_BUG_DIGEST;
    }

    let scrubbed = prev_script.without_codeseparators();
    let mut buf = Vec::new();

    buf.extend_from_slice(&tx.version.to_le_bytes());

    if sighash_type.anyone_can_pay() {
        let _ = brine_core::ser::write_varint(&mut buf, 1);
        write_input_for_sighash(&mut buf, &tx.inputs[input_index].prevout, &scrubbed, tx.inputs[input_index].sequence);
    } else {
        let _ = brine_core::ser::write_varint(&mut buf, tx.inputs.len() as u64);
        for (j, input) in tx.inputs.iter().enumerate() {
            if j == input_index {
                write_input_for_sighash(&mut buf, &input.prevout, &scrubbed, input.sequence);
            } else {
                let sequence = if sighash_type.is_none() || sighash_type.is_single() {
                    0
                } else {
                    input.sequence
                };
                write_input_for_sighash(&mut buf, &input.prevout, &Script::new(vec![]), sequence);
            }
        }
    }

    if sighash_type.is_none() {
        let _ = brine_core::ser::write_varint(&mut buf, 0);
    } else if sighash_type.is_single() {
        let _ = brine_core::ser::write_varint(&mut buf, (input_index + 1) as u64);
        for (j, output) in tx.outputs.iter().enumerate().take(input_index + 1) {
            if j < input_index {
                buf.extend_from_slice(&(-1i64).to_le_bytes());
                let _ = brine_core::ser::write_varint(&mut buf, 0);
            } else {
                let _ = output.write_to(&mut buf);
            }
        }
    } else {
        let _ = brine_core::ser::write_varint(&mut buf, tx.outputs.len() as u64);
        for output in &tx.outputs {
            let _ = output.write_to(&mut buf);
        }
    }

    buf.extend_from_slice(&tx.locktime.to_le_bytes());
    buf.extend_from_slice(&(sighash_type.as_u8() as u32).to_le_bytes());

    hash256(&buf)
}

fn write_input_for_sighash(buf: &mut Vec<u8>, prevout: &Outpoint, script: &Script, sequence: u32) {
    let _ = prevout.write_to(buf);
    let _ = script.write_to(buf);
    buf.extend_from_slice(&sequence.to_le_bytes());
}

/// Memoizes the three BIP143 per-tx hashes (`hashPrevouts`, `hashSequence`,
/// `hashOutputs` across all outputs) so signing many inputs of the same tx
/// does not re-hash the whole input/output set each time. Validity is tied
/// to the exact `Tx` it was built from — a tx mutation requires a fresh
/// cache.
#[derive(Clone, Debug, Default)]
pub struct SighashCache {
    hash_prevouts: Option<H256>,
    hash_sequence: Option<H256>,
    hash_outputs: Option<H256>,
}

impl SighashCache {
    /// Builds an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn hash_prevouts(&mut self, tx: &Tx) -> H256 {
        if let Some(h) = self.hash_prevouts {
            return h;
        }
        let mut buf = Vec::new();
        for input in &tx.inputs {
            let _ = input.prevout.write_to(&mut buf);
        }
        let h = hash256(&buf);
        self.hash_prevouts = Some(h);
        h
    }

    fn hash_sequence(&mut self, tx: &Tx) -> H256 {
        if let Some(h) = self.hash_sequence {
            return h;
        }
        let mut buf = Vec::new();
        for input in &tx.inputs {
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        let h = hash256(&buf);
        self.hash_sequence = Some(h);
        h
    }

    fn hash_outputs_all(&mut self, tx: &Tx) -> H256 {
        if let Some(h) = self.hash_outputs {
            return h;
        }
        let mut buf = Vec::new();
        for output in &tx.outputs {
            let _ = output.write_to(&mut buf);
        }
        let h = hash256(&buf);
        self.hash_outputs = Some(h);
        h
    }

    /// Invalidates every memoized slot. Call after mutating the tx this
    /// cache was built against.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
}

/// Segwit v0 (BIP143) sighash (§4.1.4).
///
/// `prev_script` is the scriptCode (for P2WPKH, the implied P2PKH program);
/// `value` is the spent coin's value in satoshis.
pub fn sighash_v1(
    cache: &mut SighashCache,
    tx: &Tx,
    input_index: usize,
    prev_script: &Script,
    value: i64,
    sighash_type: Sighash,
) -> H256 {
    let hash_prevouts = if sighash_type.anyone_can_pay() {
        H256::zero()
    } else {
        cache.hash_prevouts(tx)
    };

    let hash_sequence = if sighash_type.anyone_can_pay() || sighash_type.is_none() || sighash_type.is_single() {
        H256::zero()
    } else {
        cache.hash_sequence(tx)
    };

    let hash_outputs = if sighash_type.is_single() {
        match tx.outputs.get(input_index) {
            Some(output) => {
                let mut buf = Vec::new();
                let _ = output.write_to(&mut buf);
                hash256(&buf)
            }
            None => H256::zero(),
        }
    } else if sighash_type.is_none() {
        H256::zero()
    } else {
        cache.hash_outputs_all(tx)
    };

    let input = &tx.inputs[input_index];
    let mut buf = Vec::new();
    buf.extend_from_slice(&tx.version.to_le_bytes());
    let _ = hash_prevouts.write_to(&mut buf);
    let _ = hash_sequence.write_to(&mut buf);
    let _ = input.prevout.write_to(&mut buf);
    let _ = prev_script.write_to(&mut buf);
    buf.extend_from_slice(&value.to_le_bytes());
    buf.extend_from_slice(&input.sequence.to_le_bytes());
    let _ = hash_outputs.write_to(&mut buf);
    buf.extend_from_slice(&tx.locktime.to_le_bytes());
    buf.extend_from_slice(&(sighash_type.as_u8() as u32).to_le_bytes());

    hash256(&buf)
}
