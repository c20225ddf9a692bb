//! Stateless and view-dependent consensus checks (§4.1.6), and the
//! locktime/sequence predicates (§4.1.7).

use crate::coin::CoinLookup;
use crate::tx::Tx;
use crate::{
    COINBASE_MATURITY, LOCKTIME_THRESHOLD, MAX_BLOCK_SIZE, MAX_MONEY, SEQUENCE_DISABLE_FLAG,
    SEQUENCE_MASK, SEQUENCE_TYPE_FLAG,
};

/// A consensus-check failure: a libbitcoin-style rejection message plus the
/// ban score a peer that relayed this tx should be penalized (§7
/// `ConsensusReject`). A score of `0` means "recoverable" (e.g. an input not
/// yet seen) rather than "this peer misbehaved".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConsensusReject {
    /// The rejection reason, in the source's `bad-txns-*` vocabulary.
    pub message: &'static str,
    /// Ban score to apply to the relaying peer.
    pub score: u32,
}

impl ConsensusReject {
    const fn new(message: &'static str, score: u32) -> Self {
        Self { message, score }
    }
}

impl std::fmt::Display for ConsensusReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (score {})", self.message, self.score)
    }
}

impl std::error::Error for ConsensusReject {}

/// Stateless sanity checks: well-formedness that does not require a UTXO
/// view (§4.1.6).
pub fn check_sanity(tx: &Tx) -> Result<(), ConsensusReject> {
    if tx.inputs.is_empty() {
        return Err(ConsensusReject::new("bad-txns-vin-empty", 100));
    }
    if tx.outputs.is_empty() {
        return Err(ConsensusReject::new("bad-txns-vout-empty", 100));
    }
    if tx.base_size() > MAX_BLOCK_SIZE {
        return Err(ConsensusReject::new("bad-txns-oversize", 100));
    }

    let mut total: i64 = 0;
    for output in &tx.outputs {
        if output.value < 0 {
            return Err(ConsensusReject::new("bad-txns-vout-negative", 100));
        }
        if output.value > MAX_MONEY {
            return Err(ConsensusReject::new("bad-txns-vout-toolarge", 100));
        }
        total = match total.checked_add(output.value) {
            Some(t) if t <= MAX_MONEY => t,
            _ => return Err(ConsensusReject::new("bad-txns-txouttotal-toolarge", 100)),
        };
    }

    let mut seen = std::collections::HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.prevout) {
            return Err(ConsensusReject::new("bad-txns-inputs-duplicate", 100));
        }
    }

    if tx.is_coinbase() {
        let len = tx.inputs[0].script.as_bytes().len();
        if !(2..=100).contains(&len) {
            return Err(ConsensusReject::new("bad-cb-length", 100));
        }
    } else {
        for input in &tx.inputs {
            if input.prevout.is_null() {
                return Err(ConsensusReject::new("bad-txns-prevout-null", 10));
            }
        }
    }

    Ok(())
}

/// View-dependent checks: requires resolving each input's coin (§4.1.6).
pub fn check_inputs(
    tx: &Tx,
    view: &impl CoinLookup,
    height: u32,
) -> Result<(), ConsensusReject> {
    let mut total_in: i64 = 0;

    for input in &tx.inputs {
        let coin = match view.resolve_coin(&input.prevout) {
            Some(c) => c,
            None => return Err(ConsensusReject::new("bad-txns-inputs-missingorspent", 0)),
        };

        if coin.coinbase {
            debug_assert!(height >= coin.height, "spend height precedes coin height");
            if height.saturating_sub(coin.height) < COINBASE_MATURITY {
                return Err(ConsensusReject::new(
                    "bad-txns-premature-spend-of-coinbase",
                    0,
                ));
            }
        }

        if coin.output.value < 0 || coin.output.value > MAX_MONEY {
            return Err(ConsensusReject::new("bad-txns-inputvalues-outofrange", 100));
        }

        total_in = match total_in.checked_add(coin.output.value) {
            Some(t) if t <= MAX_MONEY => t,
            _ => return Err(ConsensusReject::new("bad-txns-inputvalues-outofrange", 100)),
        };
    }

    let mut total_out: i64 = 0;
    for output in &tx.outputs {
        total_out = match total_out.checked_add(output.value) {
            Some(t) if t <= MAX_MONEY => t,
            _ => return Err(ConsensusReject::new("bad-txns-txouttotal-toolarge", 100)),
        };
    }

    if total_out > total_in {
        return Err(ConsensusReject::new("bad-txns-in-belowout", 100));
    }

    let fee = total_in - total_out;
    if fee < 0 {
        return Err(ConsensusReject::new("bad-txns-fee-negative", 100));
    }
    if fee > MAX_MONEY {
        return Err(ConsensusReject::new("bad-txns-fee-outofrange", 100));
    }

    Ok(())
}

/// Whether `tx` opts into replace-by-fee: any input's sequence signals
/// replaceability (`< 0xfffffffe`).
pub fn is_rbf(tx: &Tx) -> bool {
    tx.inputs.iter().any(|i| i.sequence < 0xffff_fffe)
}

/// Whether `tx` is final at height `height` / time `time` (§4.1.7).
pub fn is_final(tx: &Tx, height: u32, time: u32) -> bool {
    if tx.locktime == 0 {
        return true;
    }
    let threshold = if tx.locktime < LOCKTIME_THRESHOLD {
        height
    } else {
        time
    };
    if tx.locktime < threshold {
        return true;
    }
    tx.inputs.iter().all(|i| i.sequence == 0xffff_ffff)
}

/// Absolute-locktime predicate for a single input: `tx.locktime` and `p`
/// must be in the same domain (both heights or both times), `p <=
/// tx.locktime`, and the input must not have opted out via
/// `sequence == 0xffffffff`.
pub fn verify_locktime(tx: &Tx, input_index: usize, predicate: u32) -> bool {
    let tx_is_time = tx.locktime >= LOCKTIME_THRESHOLD;
    let predicate_is_time = predicate >= LOCKTIME_THRESHOLD;
    if tx_is_time != predicate_is_time {
        return false;
    }
    if predicate > tx.locktime {
        return false;
    }
    tx.inputs[input_index].sequence != 0xffff_ffff
}

/// BIP68 relative-locktime predicate for a single input.
pub fn verify_sequence(tx: &Tx, input_index: usize, predicate: u32) -> bool {
    if predicate & SEQUENCE_DISABLE_FLAG != 0 {
        return true;
    }
    if tx.version < 2 {
        return false;
    }
    let sequence = tx.inputs[input_index].sequence;
    if sequence & SEQUENCE_DISABLE_FLAG != 0 {
        return false;
    }
    if (sequence & SEQUENCE_TYPE_FLAG) != (predicate & SEQUENCE_TYPE_FLAG) {
        return false;
    }
    (predicate & SEQUENCE_MASK) <= (sequence & SEQUENCE_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::Coin;
    use crate::script::Script;
    use crate::txio::{Input, Outpoint, Output};
    use brine_core::H256;

    struct FixedView(std::collections::HashMap<Outpoint, Coin>);

    impl CoinLookup for FixedView {
        fn resolve_coin(&self, outpoint: &Outpoint) -> Option<Coin> {
            self.0.get(outpoint).cloned()
        }
    }

    fn simple_tx() -> Tx {
        Tx {
            version: 2,
            inputs: vec![Input::new(Outpoint::new(H256::from_bytes([1u8; 32]), 0), Script::new(vec![]))],
            outputs: vec![Output::new(900, Script::new(vec![0x51]))],
            locktime: 0,
        }
    }

    #[test]
    fn rejects_empty_inputs() {
        let mut tx = simple_tx();
        tx.inputs.clear();
        let err = check_sanity(&tx).unwrap_err();
        assert_eq!(err.message, "bad-txns-vin-empty");
        assert_eq!(err.score, 100);
    }

    #[test]
    fn rejects_duplicate_inputs() {
        let mut tx = simple_tx();
        let dup = tx.inputs[0].clone();
        tx.inputs.push(dup);
        let err = check_sanity(&tx).unwrap_err();
        assert_eq!(err.message, "bad-txns-inputs-duplicate");
    }

    #[test]
    fn rejects_null_prevout_on_non_coinbase() {
        let mut tx = simple_tx();
        tx.inputs[0].prevout = Outpoint::null();
        let err = check_sanity(&tx).unwrap_err();
        assert_eq!(err.message, "bad-txns-prevout-null");
        assert_eq!(err.score, 10);
    }

    #[test]
    fn check_inputs_rejects_missing_coin() {
        let tx = simple_tx();
        let view = FixedView(std::collections::HashMap::new());
        let err = check_inputs(&tx, &view, 100).unwrap_err();
        assert_eq!(err.message, "bad-txns-inputs-missingorspent");
        assert_eq!(err.score, 0);
    }

    #[test]
    fn check_inputs_rejects_immature_coinbase() {
        let tx = simple_tx();
        let mut map = std::collections::HashMap::new();
        map.insert(
            tx.inputs[0].prevout,
            Coin::new(Output::new(1000, Script::new(vec![])), 50, true),
        );
        let view = FixedView(map);
        let err = check_inputs(&tx, &view, 60).unwrap_err();
        assert_eq!(err.message, "bad-txns-premature-spend-of-coinbase");
    }

    #[test]
    fn check_inputs_accepts_mature_coinbase() {
        let tx = simple_tx();
        let mut map = std::collections::HashMap::new();
        map.insert(
            tx.inputs[0].prevout,
            Coin::new(Output::new(1000, Script::new(vec![])), 50, true),
        );
        let view = FixedView(map);
        assert!(check_inputs(&tx, &view, 150).is_ok());
    }

    #[test]
    fn check_inputs_rejects_fee_below_zero() {
        let tx = simple_tx();
        let mut map = std::collections::HashMap::new();
        map.insert(
            tx.inputs[0].prevout,
            Coin::new(Output::new(100, Script::new(vec![])), 1, false),
        );
        let view = FixedView(map);
        let err = check_inputs(&tx, &view, 100).unwrap_err();
        assert_eq!(err.message, "bad-txns-in-belowout");
    }

    #[test]
    fn check_inputs_rejects_overflowing_output_total() {
        let mut tx = simple_tx();
        // Two outputs whose sum overflows i64 outright; must be rejected via
        // checked_add, not panic (debug) or silently wrap negative (release).
        tx.outputs = vec![
            Output::new(i64::MAX, Script::new(vec![0x51])),
            Output::new(i64::MAX, Script::new(vec![0x51])),
        ];
        let mut map = std::collections::HashMap::new();
        map.insert(
            tx.inputs[0].prevout,
            Coin::new(Output::new(1000, Script::new(vec![])), 1, false),
        );
        let view = FixedView(map);
        let err = check_inputs(&tx, &view, 100).unwrap_err();
        assert_eq!(err.message, "bad-txns-txouttotal-toolarge");
        assert_eq!(err.score, 100);
    }

    #[test]
    fn is_final_true_for_zero_locktime() {
        let tx = simple_tx();
        assert!(is_final(&tx, 100, 1000));
    }

    #[test]
    fn is_final_false_for_future_height_locktime() {
        let mut tx = simple_tx();
        tx.locktime = 500;
        tx.inputs[0].sequence = 0;
        assert!(!is_final(&tx, 100, 1000));
    }

    #[test]
    fn verify_sequence_respects_disable_flag() {
        let mut tx = simple_tx();
        tx.inputs[0].sequence = SEQUENCE_DISABLE_FLAG;
        assert!(!verify_sequence(&tx, 0, 5));
    }

    #[test]
    fn verify_sequence_requires_version_2() {
        let mut tx = simple_tx();
        tx.version = 1;
        tx.inputs[0].sequence = 5;
        assert!(!verify_sequence(&tx, 0, 5));
    }
}
