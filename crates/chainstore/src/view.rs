//! The in-flight UTXO view used while connecting or disconnecting a block
//! (§4.3.2, §4.3.4).

use brine_tx::{Coin, CoinLookup, Outpoint};
use std::collections::{HashMap, HashSet};

/// A batch of coin-table mutations plus the undo log needed to reverse
/// them.
///
/// While a block is being connected, spent coins are recorded into `undo`
/// in spend order and newly created coins go into `puts`. Disconnecting a
/// block runs the same process backwards: outputs are marked spent
/// (`deletes`) and the undo log's coins are replayed back into `puts`.
#[derive(Clone, Debug, Default)]
pub struct View {
    puts: HashMap<Outpoint, Coin>,
    deletes: HashSet<Outpoint>,
    undo: Vec<Coin>,
}

impl View {
    /// Builds an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a coin to be written (a new output, or one restored by
    /// disconnecting a later block).
    pub fn put(&mut self, outpoint: Outpoint, coin: Coin) {
        self.deletes.remove(&outpoint);
        self.puts.insert(outpoint, coin);
    }

    /// Records a coin to be removed from the table (an output being
    /// spent).
    pub fn delete(&mut self, outpoint: Outpoint) {
        self.puts.remove(&outpoint);
        self.deletes.insert(outpoint);
    }

    /// Appends a coin to the undo log, in the order its input was spent.
    pub fn push_undo(&mut self, coin: Coin) {
        self.undo.push(coin);
    }

    /// Pops the most recently pushed undo coin, in the reverse order
    /// needed to replay a disconnect.
    pub fn pop_undo(&mut self) -> Option<Coin> {
        self.undo.pop()
    }

    /// Whether every undo entry has been consumed.
    pub fn undo_is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    /// The coins this view would add to the table.
    pub fn puts(&self) -> &HashMap<Outpoint, Coin> {
        &self.puts
    }

    /// The outpoints this view would remove from the table.
    pub fn deletes(&self) -> &HashSet<Outpoint> {
        &self.deletes
    }

    /// The accumulated undo log, oldest spend first.
    pub fn undo_log(&self) -> &[Coin] {
        &self.undo
    }

    /// Rebuilds a view purely from a serialized undo log, for disconnect.
    pub fn from_undo_log(undo: Vec<Coin>) -> Self {
        Self {
            puts: HashMap::new(),
            deletes: HashSet::new(),
            undo,
        }
    }
}

impl CoinLookup for View {
    fn resolve_coin(&self, outpoint: &Outpoint) -> Option<Coin> {
        if self.deletes.contains(outpoint) {
            return None;
        }
        self.puts.get(outpoint).cloned()
    }
}
