//! Thin wrapper over `secp256k1` exposing exactly the operations the rest
//! of the node needs: key derivation, low-S signing, and DER export.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

/// Errors from the underlying `secp256k1` bindings.
#[derive(Debug, Error)]
pub enum EcdsaError {
    /// The caller-provided bytes are not a valid key, message, or signature.
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
}

/// Derives a public key from a 32-byte private key scalar.
///
/// Returns the 65-byte uncompressed form when `compressed` is `false`, or
/// the 33-byte compressed form otherwise.
pub fn pubkey_create(privkey: &[u8; 32], compressed: bool) -> Result<Vec<u8>, EcdsaError> {
    let secp = Secp256k1::signing_only();
    let sk = SecretKey::from_slice(privkey)?;
    let pk = PublicKey::from_secret_key(&secp, &sk);
    Ok(if compressed {
        pk.serialize().to_vec()
    } else {
        pk.serialize_uncompressed().to_vec()
    })
}

/// Converts an uncompressed (65-byte) or compressed (33-byte) public key to
/// its 33-byte compressed form.
pub fn pubkey_convert(pubkey: &[u8]) -> Result<[u8; 33], EcdsaError> {
    let pk = PublicKey::from_slice(pubkey)?;
    Ok(pk.serialize())
}

/// Signs a 32-byte message digest, returning a 64-byte compact signature
/// `(r, s)`. `libsecp256k1` always produces the low-`S` form.
pub fn sign(msg32: &[u8; 32], privkey: &[u8; 32]) -> Result<[u8; 64], EcdsaError> {
    let secp = Secp256k1::signing_only();
    let sk = SecretKey::from_slice(privkey)?;
    let msg = Message::from_digest_slice(msg32)?;
    let sig = secp.sign_ecdsa(&msg, &sk);
    Ok(sig.serialize_compact())
}

/// Verifies a compact signature against a message digest and public key.
pub fn verify(msg32: &[u8; 32], sig64: &[u8; 64], pubkey: &[u8]) -> Result<bool, EcdsaError> {
    let secp = Secp256k1::verification_only();
    let pk = PublicKey::from_slice(pubkey)?;
    let msg = Message::from_digest_slice(msg32)?;
    let sig = Signature::from_compact(sig64)?;
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

/// Exports a 64-byte compact signature as DER.
pub fn sig_export(sig64: &[u8; 64]) -> Result<Vec<u8>, EcdsaError> {
    let sig = Signature::from_compact(sig64)?;
    Ok(sig.serialize_der().to_vec())
}

/// Imports a DER-encoded signature to its 64-byte compact form. The caller
/// is expected to have already stripped any trailing sighash-type byte.
pub fn sig_import(der: &[u8]) -> Result<[u8; 64], EcdsaError> {
    let sig = Signature::from_der(der)?;
    Ok(sig.serialize_compact())
}
