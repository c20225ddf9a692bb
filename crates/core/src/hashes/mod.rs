//! Hash functions consumed by the rest of the node: SHA-256, double-SHA-256
//! ("hash256"), RIPEMD-160, the composed "hash160", and SipHash-2-4.

mod hash256;

pub use hash256::Hash256Writer;

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use siphasher::sip::SipHasher24;
use std::hash::Hasher;

use crate::primitives::H256;

/// `SHA-256(data)`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// `SHA-256(SHA-256(data))`, returned as an [`H256`].
pub fn hash256(data: &[u8]) -> H256 {
    H256::from_bytes(sha256(&sha256(data)))
}

/// `RIPEMD-160(data)`.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// `RIPEMD-160(SHA-256(data))`, the hash used for P2PKH/P2WPKH programs.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

/// SipHash-2-4 keyed with a 16-byte key, matching BIP-152 short-ID
/// derivation: the key is the first 8 and second 8 bytes of `key16`
/// interpreted as little-endian `u64`s.
pub fn siphash24(key16: &[u8; 16], data: &[u8]) -> u64 {
    let k0 = u64::from_le_bytes(key16[0..8].try_into().unwrap());
    let k1 = u64::from_le_bytes(key16[8..16].try_into().unwrap());
    let mut hasher = SipHasher24::new_with_keys(k0, k1);
    hasher.write(data);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash256_is_double_sha256() {
        let data = b"hello world";
        let once = sha256(data);
        let twice = sha256(&once);
        assert_eq!(hash256(data).as_bytes(), &twice);
    }

    #[test]
    fn hash160_is_ripemd_of_sha256() {
        let data = b"hello world";
        let expect = ripemd160(&sha256(data));
        assert_eq!(hash160(data), expect);
    }

    #[test]
    fn siphash_is_deterministic() {
        let key = [0u8; 16];
        assert_eq!(siphash24(&key, b"abc"), siphash24(&key, b"abc"));
        assert_ne!(siphash24(&key, b"abc"), siphash24(&key, b"abd"));
    }
}
