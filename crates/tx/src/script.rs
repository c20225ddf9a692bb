//! Scripts are treated as opaque byte strings — `brine` does not implement
//! a script interpreter (explicitly out of scope) — except for the small
//! set of standard-template pattern matches that sighashing and signing
//! need to recognize (§4.1.5).

use std::io::{Read, Write};

use brine_core::ser::{read_prefixed_bytes, write_prefixed_bytes, ByteFormat, SerResult};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_EQUAL: u8 = 0x87;
const OP_CHECKSIG: u8 = 0xac;
const OP_0: u8 = 0x00;
const OP_CODESEPARATOR: u8 = 0xab;
const PUSH_20: u8 = 0x14;
const PUSH_33: u8 = 0x21;
const PUSH_65: u8 = 0x41;

/// An opaque Bitcoin script: a plain byte string with no assigned meaning
/// beyond the handful of standard templates [`Script::standard_type`]
/// recognizes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Script(pub Vec<u8>);

/// Standard script templates `brine` can sign for; everything else is
/// [`ScriptType::NonStandard`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptType {
    /// `<pubkey> OP_CHECKSIG`.
    P2PK,
    /// `OP_DUP OP_HASH160 <hash160> OP_EQUALVERIFY OP_CHECKSIG`.
    P2PKH,
    /// `OP_HASH160 <hash160> OP_EQUAL`.
    P2SH,
    /// `OP_0 <hash160>` (20-byte program).
    P2WPKH,
    /// Anything else.
    NonStandard,
}

impl Script {
    /// Wraps raw script bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns a copy of `self` with every `OP_CODESEPARATOR` byte removed,
    /// per legacy sighash step 2 (§4.1.3). This is a byte-level scrub, not a
    /// script-aware one: `brine` does not parse push-data lengths, so a
    /// `0xab` inside a pushed data blob is (as in the historical protocol
    /// quirk it reproduces) also stripped.
    pub fn without_codeseparators(&self) -> Script {
        Script(
            self.0
                .iter()
                .copied()
                .filter(|&b| b != OP_CODESEPARATOR)
                .collect(),
        )
    }

    /// Classifies `self` against the standard templates.
    pub fn standard_type(&self) -> ScriptType {
        if self.get_p2pk().is_some() {
            ScriptType::P2PK
        } else if self.get_p2pkh().is_some() {
            ScriptType::P2PKH
        } else if self.get_p2wpkh().is_some() {
            ScriptType::P2WPKH
        } else if self.get_p2sh().is_some() {
            ScriptType::P2SH
        } else {
            ScriptType::NonStandard
        }
    }

    /// Matches `<pubkey:33|65> OP_CHECKSIG`, returning the pubkey bytes.
    pub fn get_p2pk(&self) -> Option<&[u8]> {
        let b = &self.0;
        if b.len() == 35 && b[0] == PUSH_33 && b[34] == OP_CHECKSIG {
            Some(&b[1..34])
        } else if b.len() == 67 && b[0] == PUSH_65 && b[66] == OP_CHECKSIG {
            Some(&b[1..66])
        } else {
            None
        }
    }

    /// Matches `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`.
    pub fn get_p2pkh(&self) -> Option<[u8; 20]> {
        let b = &self.0;
        if b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == PUSH_20
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&b[3..23]);
            Some(hash)
        } else {
            None
        }
    }

    /// Matches `OP_HASH160 <20> OP_EQUAL`.
    pub fn get_p2sh(&self) -> Option<[u8; 20]> {
        let b = &self.0;
        if b.len() == 23 && b[0] == OP_HASH160 && b[1] == PUSH_20 && b[22] == OP_EQUAL {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&b[2..22]);
            Some(hash)
        } else {
            None
        }
    }

    /// Matches the 20-byte witness v0 program `OP_0 <20>`.
    pub fn get_p2wpkh(&self) -> Option<[u8; 20]> {
        let b = &self.0;
        if b.len() == 22 && b[0] == OP_0 && b[1] == PUSH_20 {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&b[2..22]);
            Some(hash)
        } else {
            None
        }
    }

    /// Builds `OP_DUP OP_HASH160 <hash160> OP_EQUALVERIFY OP_CHECKSIG`.
    pub fn p2pkh(hash160: &[u8; 20]) -> Script {
        let mut v = vec![OP_DUP, OP_HASH160, PUSH_20];
        v.extend_from_slice(hash160);
        v.push(OP_EQUALVERIFY);
        v.push(OP_CHECKSIG);
        Script(v)
    }

    /// Builds the 20-byte witness v0 program `OP_0 <hash160>`.
    pub fn p2wpkh(hash160: &[u8; 20]) -> Script {
        let mut v = vec![OP_0, PUSH_20];
        v.extend_from_slice(hash160);
        Script(v)
    }

    /// Builds `OP_HASH160 <hash160> OP_EQUAL`.
    pub fn p2sh(hash160: &[u8; 20]) -> Script {
        let mut v = vec![OP_HASH160, PUSH_20];
        v.extend_from_slice(hash160);
        v.push(OP_EQUAL);
        Script(v)
    }

    /// Builds a script that pushes `data` as a single element (used for a
    /// scriptSig that simply pushes a redeem program, e.g. P2SH-P2WPKH).
    pub fn push_data(data: &[u8]) -> Script {
        let mut v = Vec::with_capacity(data.len() + 5);
        brine_core::ser::write_prefixed_bytes(&mut v, data)
            .expect("writing to a Vec never fails");
        Script(v)
    }
}

impl ByteFormat for Script {
    fn read_from<R: Read>(reader: &mut R) -> SerResult<Self> {
        Ok(Script(read_prefixed_bytes(reader)?))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> SerResult<usize> {
        write_prefixed_bytes(writer, &self.0)
    }

    fn serialized_length(&self) -> usize {
        brine_core::ser::varint_len(self.0.len() as u64) + self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_p2pkh() {
        let hash = [9u8; 20];
        let script = Script::p2pkh(&hash);
        assert_eq!(script.standard_type(), ScriptType::P2PKH);
        assert_eq!(script.get_p2pkh(), Some(hash));
    }

    #[test]
    fn recognizes_p2wpkh() {
        let hash = [3u8; 20];
        let script = Script::p2wpkh(&hash);
        assert_eq!(script.standard_type(), ScriptType::P2WPKH);
    }

    #[test]
    fn strips_codeseparators() {
        let script = Script(vec![0x51, OP_CODESEPARATOR, 0x52]);
        assert_eq!(script.without_codeseparators().0, vec![0x51, 0x52]);
    }

    #[test]
    fn nonstandard_otherwise() {
        let script = Script(vec![0x51, 0x52]);
        assert_eq!(script.standard_type(), ScriptType::NonStandard);
    }
}
