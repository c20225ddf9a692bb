//! A UTXO record and the lookup interface `check_inputs` needs into
//! whatever view of the chain the caller maintains (§4.1.6, §9 "duck-typed
//! view callback pattern").

use std::io::{Read, Write};

use brine_core::ser::{ByteFormat, SerResult};

use crate::txio::Output;

/// A single unspent transaction output plus the provenance `check_inputs`
/// needs: the height it was mined at, whether it came from a coinbase (for
/// maturity checking), and the originating transaction's version (carried
/// for parity with the source's `Coin` record; nothing in this spec's
/// operations branches on it — BIP30's special-cased duplicate-coinbase
/// check is out of scope here).
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Coin {
    /// The output itself.
    pub output: Output,
    /// Height of the block that created this coin.
    pub height: u32,
    /// Whether the creating transaction was a coinbase.
    pub coinbase: bool,
    /// Version of the transaction that created this coin.
    pub version: i32,
}

impl Coin {
    /// Builds a coin with `version = 1` (the overwhelming common case; use
    /// the struct literal directly to carry a different originating
    /// version).
    pub fn new(output: Output, height: u32, coinbase: bool) -> Self {
        Self {
            output,
            height,
            coinbase,
            version: 1,
        }
    }
}

impl ByteFormat for Coin {
    fn read_from<R: Read>(reader: &mut R) -> SerResult<Self> {
        let output = Output::read_from(reader)?;
        let height = Self::read_u32_le(reader)?;
        let mut flag = [0u8; 1];
        reader.read_exact(&mut flag)?;
        let version = read_i32_le(reader)?;
        Ok(Self {
            output,
            height,
            coinbase: flag[0] != 0,
            version,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> SerResult<usize> {
        let mut n = self.output.write_to(writer)?;
        n += Self::write_u32_le(writer, self.height)?;
        n += writer.write(&[self.coinbase as u8])?;
        n += write_i32_le(writer, self.version)?;
        Ok(n)
    }

    fn serialized_length(&self) -> usize {
        self.output.serialized_length() + 4 + 1 + 4
    }
}

fn read_i32_le<R: Read>(reader: &mut R) -> SerResult<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn write_i32_le<W: Write>(writer: &mut W, v: i32) -> SerResult<usize> {
    Ok(writer.write(&v.to_le_bytes())?)
}

/// The read-side of a UTXO view: resolves an outpoint to the coin it
/// references, without committing to any particular backing store.
///
/// `brine-tx` depends on nothing from `brine-chainstore`; the chainstore's
/// `View` implements this trait instead, keeping the dependency pointed one
/// way.
pub trait CoinLookup {
    /// Returns the coin at `outpoint`, or `None` if it is unknown or
    /// already spent. Unresolved coins are not an error at this layer.
    fn resolve_coin(&self, outpoint: &crate::txio::Outpoint) -> Option<Coin>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;

    #[test]
    fn coin_round_trips() {
        let coin = Coin::new(Output::new(5000, Script::new(vec![0x51])), 200, false);
        let mut buf = Vec::new();
        coin.write_to(&mut buf).unwrap();
        let mut cur = &buf[..];
        assert_eq!(Coin::read_from(&mut cur).unwrap(), coin);
    }

    #[test]
    fn coinbase_flag_round_trips() {
        let coin = Coin::new(Output::new(0, Script::new(vec![])), 0, true);
        let mut buf = Vec::new();
        coin.write_to(&mut buf).unwrap();
        let mut cur = &buf[..];
        assert!(Coin::read_from(&mut cur).unwrap().coinbase);
    }
}
