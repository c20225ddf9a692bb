//! Signing and verification dispatch over the standard script templates
//! (§4.1.5): `sign_input` produces a scriptSig/witness for a coin this
//! process holds the key for, and `verify_input` checks one that is already
//! there, for the same set of shapes.

use brine_core::{ecdsa, hash160};

use crate::coin::Coin;
use crate::error::TxError;
use crate::script::Script;
use crate::sighash::{is_single_bug, sighash_v0, sighash_v1, Sighash, SighashCache};
use crate::tx::Tx;

/// Signs `tx`'s input `input_index` against `coin` (the output it spends)
/// with `privkey`, using sighash type `sighash_type`.
///
/// Dispatches on `coin.output.script`'s shape: P2PK, P2PKH, P2WPKH, or
/// P2SH-wrapped P2WPKH. Any other shape is [`TxError::UnsupportedScript`].
/// On success, mutates `tx.inputs[input_index]`'s `script`/`witness` in
/// place and invalidates `cache` (a sighash cache's validity is tied to the
/// exact tx it was built against, and this call just changed that tx).
pub fn sign_input(
    tx: &mut Tx,
    input_index: usize,
    coin: &Coin,
    privkey: &[u8; 32],
    sighash_type: Sighash,
    cache: &mut SighashCache,
) -> Result<(), TxError> {
    if input_index >= tx.inputs.len() {
        return Err(TxError::InputIndexOutOfRange(input_index));
    }
    if sighash_type.base() == Sighash::None as u8 {
        return Err(TxError::NoneUnsupported);
    }
    if is_single_bug(tx, input_index, sighash_type) {
        return Err(TxError::SighashSingleBug(input_index));
    }

    let pub65 = ecdsa::pubkey_create(privkey, false)?;
    let pub33 = ecdsa::pubkey_create(privkey, true)?;
    let hash65 = hash160(&pub65);
    let hash33 = hash160(&pub33);

    let prev_script = &coin.output.script;

    if let Some(pubkey) = prev_script.get_p2pk() {
        if pubkey == pub33.as_slice() || pubkey == pub65.as_slice() {
            let digest = sighash_v0(tx, input_index, prev_script, sighash_type);
            let sig = sign_and_append_type(&digest, privkey, sighash_type)?;
            tx.inputs[input_index].script = Script::push_data(&sig);
            cache.invalidate();
            return Ok(());
        }
        return Err(TxError::UnsupportedScript);
    }

    if let Some(hash) = prev_script.get_p2pkh() {
        let pubkey: &[u8] = if hash == hash33 {
            &pub33
        } else if hash == hash65 {
            &pub65
        } else {
            return Err(TxError::UnsupportedScript);
        };
        let digest = sighash_v0(tx, input_index, prev_script, sighash_type);
        let sig = sign_and_append_type(&digest, privkey, sighash_type)?;
        let mut script = Vec::new();
        brine_core::ser::write_prefixed_bytes(&mut script, &sig).expect("writing to a Vec never fails");
        brine_core::ser::write_prefixed_bytes(&mut script, pubkey).expect("writing to a Vec never fails");
        tx.inputs[input_index].script = Script::new(script);
        cache.invalidate();
        return Ok(());
    }

    if let Some(hash) = prev_script.get_p2wpkh() {
        if hash != hash33 {
            return Err(TxError::UnsupportedScript);
        }
        let redeem = Script::p2pkh(&hash33);
        let digest = sighash_v1(cache, tx, input_index, &redeem, coin.output.value, sighash_type);
        let sig = sign_and_append_type(&digest, privkey, sighash_type)?;
        tx.inputs[input_index].witness = vec![sig, pub33.to_vec()];
        return Ok(());
    }

    if let Some(hash) = prev_script.get_p2sh() {
        let wrapped_program = Script::p2wpkh(&hash33);
        if hash160(&wrapped_program.0) != hash {
            return Err(TxError::UnsupportedScript);
        }
        tx.inputs[input_index].script = Script::push_data(&wrapped_program.0);
        let redeem = Script::p2pkh(&hash33);
        let digest = sighash_v1(cache, tx, input_index, &redeem, coin.output.value, sighash_type);
        let sig = sign_and_append_type(&digest, privkey, sighash_type)?;
        tx.inputs[input_index].witness = vec![sig, pub33.to_vec()];
        return Ok(());
    }

    Err(TxError::UnsupportedScript)
}

fn sign_and_append_type(
    digest: &brine_core::H256,
    privkey: &[u8; 32],
    sighash_type: Sighash,
) -> Result<Vec<u8>, TxError> {
    let sig64 = ecdsa::sign(digest.as_bytes(), privkey)?;
    let mut der = ecdsa::sig_export(&sig64)?;
    der.push(sighash_type.as_u8());
    Ok(der)
}

/// Policy flags for [`verify_input`]. `brine` has no script interpreter
/// (out of scope), so there is nothing for these bits to gate yet; the type
/// exists so callers can name a policy the way a future interpreter would
/// consume one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VerifyFlags(pub u32);

/// The flag set a relaying node applies to transactions before accepting
/// them into its mempool. Carries no bits `verify_input` branches on today.
pub const STANDARD_FLAGS: VerifyFlags = VerifyFlags(0);

/// Checks that `tx`'s input `input_index` satisfies `coin`'s spending
/// condition, for the same standard script templates [`sign_input`] can
/// produce (§4.1.5): P2PK, P2PKH, P2WPKH, and P2SH-wrapped P2WPKH.
///
/// This recomputes the appropriate sighash (legacy or BIP143) and checks the
/// embedded signature against the embedded or implied public key — it is
/// not a script interpreter. A scriptSig/witness that doesn't match one of
/// the supported shapes, or a signature that fails to parse or verify,
/// returns `Ok(false)` rather than an error; only a malformed `input_index`
/// is an error.
pub fn verify_input(
    tx: &Tx,
    input_index: usize,
    coin: &Coin,
    _flags: VerifyFlags,
    cache: &mut SighashCache,
) -> Result<bool, TxError> {
    if input_index >= tx.inputs.len() {
        return Err(TxError::InputIndexOutOfRange(input_index));
    }

    let input = &tx.inputs[input_index];
    let prev_script = &coin.output.script;

    if let Some(pubkey) = prev_script.get_p2pk() {
        let sig_with_type = match read_single_push(input.script.as_bytes()) {
            Some(s) => s,
            None => return Ok(false),
        };
        return Ok(verify_legacy(tx, input_index, prev_script, pubkey, &sig_with_type));
    }

    if prev_script.get_p2pkh().is_some() {
        let (sig_with_type, pubkey) = match read_two_pushes(input.script.as_bytes()) {
            Some(p) => p,
            None => return Ok(false),
        };
        return Ok(verify_legacy(tx, input_index, prev_script, &pubkey, &sig_with_type));
    }

    if let Some(hash) = prev_script.get_p2wpkh() {
        let redeem = Script::p2pkh(&hash);
        return Ok(verify_segwit(cache, tx, input_index, &redeem, coin.output.value, &input.witness));
    }

    if let Some(hash) = prev_script.get_p2sh() {
        let wrapped = match read_single_push(input.script.as_bytes()) {
            Some(w) => w,
            None => return Ok(false),
        };
        if hash160(&wrapped) != hash {
            return Ok(false);
        }
        let inner_hash = match Script::new(wrapped).get_p2wpkh() {
            Some(h) => h,
            None => return Ok(false),
        };
        let redeem = Script::p2pkh(&inner_hash);
        return Ok(verify_segwit(cache, tx, input_index, &redeem, coin.output.value, &input.witness));
    }

    Ok(false)
}

/// Splits a scriptSig/witness element's trailing sighash-type byte off a
/// DER signature, imports the DER, and checks it against `digest`.
fn verify_legacy(
    tx: &Tx,
    input_index: usize,
    prev_script: &Script,
    pubkey: &[u8],
    sig_with_type: &[u8],
) -> bool {
    let (der, sighash_byte) = match sig_with_type.split_last() {
        Some((&last, rest)) => (rest, last),
        None => return false,
    };
    let sighash_type = match Sighash::from_u8(sighash_byte) {
        Ok(t) => t,
        Err(_) => return false,
    };
    let sig64 = match ecdsa::sig_import(der) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let digest = sighash_v0(tx, input_index, prev_script, sighash_type);
    ecdsa::verify(digest.as_bytes(), &sig64, pubkey).unwrap_or(false)
}

fn verify_segwit(
    cache: &mut SighashCache,
    tx: &Tx,
    input_index: usize,
    redeem: &Script,
    value: i64,
    witness: &[Vec<u8>],
) -> bool {
    if witness.len() != 2 {
        return false;
    }
    let (der, sighash_byte) = match witness[0].split_last() {
        Some((&last, rest)) => (rest, last),
        None => return false,
    };
    let sighash_type = match Sighash::from_u8(sighash_byte) {
        Ok(t) => t,
        Err(_) => return false,
    };
    let sig64 = match ecdsa::sig_import(der) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let digest = sighash_v1(cache, tx, input_index, redeem, value, sighash_type);
    ecdsa::verify(digest.as_bytes(), &sig64, &witness[1]).unwrap_or(false)
}

/// Reads a single length-prefixed push and requires it to consume the whole
/// byte string (scriptSigs `brine` produces never contain more than this).
fn read_single_push(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut cursor = bytes;
    let item = brine_core::ser::read_prefixed_bytes(&mut cursor).ok()?;
    if !cursor.is_empty() {
        return None;
    }
    Some(item)
}

/// Reads two consecutive length-prefixed pushes and requires them to
/// consume the whole byte string.
fn read_two_pushes(bytes: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut cursor = bytes;
    let first = brine_core::ser::read_prefixed_bytes(&mut cursor).ok()?;
    let second = brine_core::ser::read_prefixed_bytes(&mut cursor).ok()?;
    if !cursor.is_empty() {
        return None;
    }
    Some((first, second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txio::{Input, Outpoint, Output};
    use brine_core::H256;

    fn tx_spending(prevout_script: Script, value: i64) -> (Tx, Coin) {
        let tx = Tx {
            version: 2,
            inputs: vec![Input::new(Outpoint::new(H256::zero(), 0), Script::new(vec![]))],
            outputs: vec![Output::new(value - 500, Script::new(vec![0x51]))],
            locktime: 0,
        };
        let coin = Coin::new(Output::new(value, prevout_script), 10, false);
        (tx, coin)
    }

    #[test]
    fn signs_p2pkh() {
        let privkey = [7u8; 32];
        let pub33 = ecdsa::pubkey_create(&privkey, true).unwrap();
        let hash = hash160(&pub33);
        let (mut tx, coin) = tx_spending(Script::p2pkh(&hash), 10_000);
        let mut cache = SighashCache::new();
        sign_input(&mut tx, 0, &coin, &privkey, Sighash::All, &mut cache).unwrap();
        assert!(!tx.inputs[0].script.as_bytes().is_empty());
        assert!(tx.inputs[0].witness.is_empty());
    }

    #[test]
    fn signs_p2wpkh() {
        let privkey = [9u8; 32];
        let pub33 = ecdsa::pubkey_create(&privkey, true).unwrap();
        let hash = hash160(&pub33);
        let (mut tx, coin) = tx_spending(Script::p2wpkh(&hash), 10_000);
        let mut cache = SighashCache::new();
        sign_input(&mut tx, 0, &coin, &privkey, Sighash::All, &mut cache).unwrap();
        assert_eq!(tx.inputs[0].witness.len(), 2);
        assert!(tx.inputs[0].script.as_bytes().is_empty());
    }

    #[test]
    fn signs_then_verifies_p2wpkh() {
        let privkey = [9u8; 32];
        let pub33 = ecdsa::pubkey_create(&privkey, true).unwrap();
        let hash = hash160(&pub33);
        let (mut tx, coin) = tx_spending(Script::p2wpkh(&hash), 10_000);
        let mut cache = SighashCache::new();
        sign_input(&mut tx, 0, &coin, &privkey, Sighash::All, &mut cache).unwrap();
        cache.invalidate();
        assert!(verify_input(&tx, 0, &coin, STANDARD_FLAGS, &mut cache).unwrap());
    }

    #[test]
    fn verify_input_rejects_wrong_key_signature() {
        let privkey = [9u8; 32];
        let other_key = [10u8; 32];
        let pub33 = ecdsa::pubkey_create(&privkey, true).unwrap();
        let hash = hash160(&pub33);
        let (mut tx, coin) = tx_spending(Script::p2wpkh(&hash), 10_000);
        let mut cache = SighashCache::new();
        sign_input(&mut tx, 0, &coin, &privkey, Sighash::All, &mut cache).unwrap();
        // Swap in a signature from a different key but keep the original pubkey.
        let digest = sighash_v1(
            &mut SighashCache::new(),
            &tx,
            0,
            &Script::p2pkh(&hash),
            coin.output.value,
            Sighash::All,
        );
        let forged = sign_and_append_type(&digest, &other_key, Sighash::All).unwrap();
        tx.inputs[0].witness[0] = forged;
        cache.invalidate();
        assert!(!verify_input(&tx, 0, &coin, STANDARD_FLAGS, &mut cache).unwrap());
    }

    #[test]
    fn signs_then_verifies_p2pkh() {
        let privkey = [7u8; 32];
        let pub33 = ecdsa::pubkey_create(&privkey, true).unwrap();
        let hash = hash160(&pub33);
        let (mut tx, coin) = tx_spending(Script::p2pkh(&hash), 10_000);
        let mut cache = SighashCache::new();
        sign_input(&mut tx, 0, &coin, &privkey, Sighash::All, &mut cache).unwrap();
        assert!(verify_input(&tx, 0, &coin, STANDARD_FLAGS, &mut cache).unwrap());
    }

    #[test]
    fn signs_then_verifies_p2sh_wrapped_p2wpkh() {
        let privkey = [11u8; 32];
        let pub33 = ecdsa::pubkey_create(&privkey, true).unwrap();
        let hash = hash160(&pub33);
        let wrapped = Script::p2wpkh(&hash);
        let sh = hash160(&wrapped.0);
        let (mut tx, coin) = tx_spending(Script::p2sh(&sh), 10_000);
        let mut cache = SighashCache::new();
        sign_input(&mut tx, 0, &coin, &privkey, Sighash::All, &mut cache).unwrap();
        cache.invalidate();
        assert!(verify_input(&tx, 0, &coin, STANDARD_FLAGS, &mut cache).unwrap());
    }

    #[test]
    fn signs_p2sh_wrapped_p2wpkh() {
        let privkey = [11u8; 32];
        let pub33 = ecdsa::pubkey_create(&privkey, true).unwrap();
        let hash = hash160(&pub33);
        let wrapped = Script::p2wpkh(&hash);
        let sh = hash160(&wrapped.0);
        let (mut tx, coin) = tx_spending(Script::p2sh(&sh), 10_000);
        let mut cache = SighashCache::new();
        sign_input(&mut tx, 0, &coin, &privkey, Sighash::All, &mut cache).unwrap();
        assert_eq!(tx.inputs[0].witness.len(), 2);
        assert!(!tx.inputs[0].script.as_bytes().is_empty());
    }

    #[test]
    fn signs_then_verifies_p2pk() {
        let privkey = [13u8; 32];
        let pub33 = ecdsa::pubkey_create(&privkey, true).unwrap();
        let mut script = vec![0x21];
        script.extend_from_slice(&pub33);
        script.push(0xac);
        let (mut tx, coin) = tx_spending(Script::new(script), 10_000);
        let mut cache = SighashCache::new();
        sign_input(&mut tx, 0, &coin, &privkey, Sighash::All, &mut cache).unwrap();
        assert!(verify_input(&tx, 0, &coin, STANDARD_FLAGS, &mut cache).unwrap());
    }

    #[test]
    fn rejects_mismatched_key() {
        let signing_key = [3u8; 32];
        let other_key = [4u8; 32];
        let other_pub = ecdsa::pubkey_create(&other_key, true).unwrap();
        let hash = hash160(&other_pub);
        let (mut tx, coin) = tx_spending(Script::p2pkh(&hash), 10_000);
        let mut cache = SighashCache::new();
        let err = sign_input(&mut tx, 0, &coin, &signing_key, Sighash::All, &mut cache).unwrap_err();
        assert!(matches!(err, TxError::UnsupportedScript));
    }
}
