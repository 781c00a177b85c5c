//! Per-transaction collections of coin entries.

use bitcoin::{OutPoint, Transaction, TxOut, Txid};

use crate::coin::{Coin, is_unspendable};
use crate::coin_entry::CoinEntry;
use crate::error::Result;

/// The outputs of one transaction, addressed by output index.
///
/// Slots may be empty: an interior hole marks an output that never existed
/// in the view (unspendable, or removed outright) and is kept so the
/// indexes of every remaining entry stay stable. Trailing empty slots are
/// trimmed after every mutation. Spent entries are tombstones, retained for
/// undo bookkeeping rather than deleted.
#[derive(Debug, Clone)]
pub struct Coins {
    txid: Txid,
    outputs: Vec<Option<CoinEntry>>,
}

impl Coins {
    /// An empty collection owned by `txid`.
    pub fn new(txid: Txid) -> Self {
        Self {
            txid,
            outputs: Vec::new(),
        }
    }

    /// Populates a slot for every output of `tx`.
    ///
    /// Unspendable outputs become permanent holes: they are never
    /// materialized and can never be added later.
    pub fn from_tx(tx: &Transaction, height: Option<u32>) -> Self {
        let mut coins = Self::new(tx.compute_txid());
        for index in 0..tx.output.len() {
            if is_unspendable(&tx.output[index].script_pubkey) {
                coins.outputs.push(None);
                continue;
            }
            coins
                .outputs
                .push(Some(CoinEntry::from_tx(tx, index as u32, height)));
        }
        coins.cleanup();
        coins
    }

    /// The owning transaction id.
    pub fn txid(&self) -> Txid {
        self.txid
    }

    /// Inserts `entry` at `index`, growing the collection with holes as
    /// needed.
    ///
    /// Panics if the slot is already occupied; callers overwrite by
    /// removing first.
    pub fn add(&mut self, index: u32, entry: CoinEntry) {
        let index = index as usize;
        if index >= self.outputs.len() {
            self.outputs.resize_with(index + 1, || None);
        }
        assert!(
            self.outputs[index].is_none(),
            "coin slot {index} is already occupied"
        );
        self.outputs[index] = Some(entry);
    }

    /// Wraps `output` into an entry at `index`; unspendable outputs are
    /// never stored.
    pub fn add_output(&mut self, index: u32, output: TxOut) {
        if is_unspendable(&output.script_pubkey) {
            return;
        }
        self.add(index, CoinEntry::from_output(output));
    }

    /// Reinstates a materialized coin at its own output index.
    pub fn add_coin(&mut self, coin: Coin) {
        debug_assert_eq!(coin.outpoint.txid, self.txid);
        if is_unspendable(&coin.output.script_pubkey) {
            return;
        }
        let index = coin.outpoint.vout;
        self.add(index, CoinEntry::from_coin(coin));
    }

    /// Whether a slot exists and is occupied.
    pub fn has(&self, index: u32) -> bool {
        self.get(index).is_some()
    }

    /// Whether the slot holds an entry that has not been spent.
    pub fn is_unspent(&self, index: u32) -> bool {
        self.get(index).is_some_and(|entry| !entry.spent)
    }

    pub fn get(&self, index: u32) -> Option<&CoinEntry> {
        self.outputs.get(index as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, index: u32) -> Option<&mut CoinEntry> {
        self.outputs.get_mut(index as usize)?.as_mut()
    }

    /// The decoded output at `index`, if any.
    pub fn output(&mut self, index: u32) -> Result<Option<&TxOut>> {
        match self.get_mut(index) {
            Some(entry) => entry.output().map(Some),
            None => Ok(None),
        }
    }

    /// A materialized [`Coin`] for the entry at `index`, if any.
    pub fn coin(&mut self, index: u32) -> Result<Option<Coin>> {
        let txid = self.txid;
        match self.get_mut(index) {
            Some(entry) => entry.to_coin(OutPoint { txid, vout: index }).map(Some),
            None => Ok(None),
        }
    }

    /// Marks the entry at `index` spent and returns its pre-spend state.
    ///
    /// Returns `None`, leaving the collection untouched, when the slot is
    /// empty or the entry was already spent.
    pub fn spend(&mut self, index: u32) -> Option<CoinEntry> {
        let entry = self.get_mut(index)?;
        if entry.spent {
            return None;
        }
        let undo = entry.clone();
        entry.spent = true;
        Some(undo)
    }

    /// Clears the slot at `index` outright and prunes the tail.
    pub fn remove(&mut self, index: u32) -> Option<CoinEntry> {
        let entry = self.outputs.get_mut(index as usize)?.take()?;
        self.cleanup();
        Some(entry)
    }

    /// One past the highest index holding an unspent entry.
    ///
    /// A fully spent or absent tail does not count.
    pub fn len(&self) -> usize {
        self.outputs
            .iter()
            .rposition(|slot| slot.as_ref().is_some_and(|entry| !entry.spent))
            .map_or(0, |index| index + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Trims trailing empty slots. Interior holes are never compacted.
    pub fn cleanup(&mut self) {
        while matches!(self.outputs.last(), Some(None)) {
            self.outputs.pop();
        }
    }

    pub(crate) fn mark_all_spent(&mut self) {
        for entry in self.outputs.iter_mut().flatten() {
            entry.spent = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::hashes::Hash;
    use bitcoin::opcodes::all::OP_RETURN;
    use bitcoin::script::Builder;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, PubkeyHash, ScriptBuf, Sequence, TxIn, Witness};

    fn spendable(value: u64, tag: u8) -> TxOut {
        TxOut {
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([tag; 20])),
        }
    }

    fn data_carrier() -> TxOut {
        TxOut {
            value: Amount::ZERO,
            script_pubkey: Builder::new().push_opcode(OP_RETURN).into_script(),
        }
    }

    fn tx_with_outputs(outputs: Vec<TxOut>) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([0xaa; 32]),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: outputs,
        }
    }

    fn three_coins() -> Coins {
        let tx = tx_with_outputs(vec![
            spendable(1_000, 1),
            spendable(2_000, 2),
            spendable(3_000, 3),
        ]);
        Coins::from_tx(&tx, Some(1))
    }

    #[test]
    fn test_spend_shrinks_len_only_from_the_tail() {
        let mut coins = three_coins();
        assert_eq!(coins.len(), 3);

        // A non-final spend leaves the length untouched.
        assert!(coins.spend(0).is_some());
        assert_eq!(coins.len(), 3);

        // Spending the final unspent index shrinks it, repeatably.
        assert!(coins.spend(2).is_some());
        assert_eq!(coins.len(), 2);
        assert!(coins.spend(1).is_some());
        assert_eq!(coins.len(), 0);
        assert!(coins.is_empty());
    }

    #[test]
    fn test_spend_is_idempotent_and_side_effect_free_on_failure() {
        let mut coins = three_coins();
        assert!(coins.spend(1).is_some());
        assert!(coins.spend(1).is_none());
        assert!(coins.spend(9).is_none());
        assert!(coins.get(1).unwrap().is_spent());
        assert!(coins.has(1));
    }

    #[test]
    fn test_spend_returns_the_pre_spend_entry() {
        let mut coins = three_coins();
        let undo = coins.spend(0).unwrap();
        assert!(!undo.is_spent());
        assert!(coins.get(0).unwrap().is_spent());
    }

    #[test]
    fn test_remove_prunes_only_the_tail() {
        let mut coins = three_coins();
        assert!(coins.remove(1).is_some());
        // Interior hole: indexes past it stay reachable.
        assert!(!coins.has(1));
        assert!(coins.has(2));
        assert_eq!(coins.len(), 3);

        assert!(coins.remove(2).is_some());
        // Both the removed slot and the interior hole behind it are gone.
        assert_eq!(coins.len(), 1);
        assert!(coins.remove(5).is_none());
    }

    #[test]
    fn test_from_tx_skips_unspendable_outputs() {
        let tx = tx_with_outputs(vec![spendable(1_000, 1), data_carrier(), spendable(3_000, 3)]);
        let coins = Coins::from_tx(&tx, Some(10));
        assert!(coins.has(0));
        assert!(!coins.has(1));
        assert!(coins.has(2));
        assert_eq!(coins.len(), 3);
    }

    #[test]
    fn test_from_tx_trims_an_unspendable_tail() {
        let tx = tx_with_outputs(vec![spendable(1_000, 1), data_carrier()]);
        let coins = Coins::from_tx(&tx, Some(10));
        assert_eq!(coins.len(), 1);
        assert!(!coins.has(1));
    }

    #[test]
    fn test_add_output_rejects_unspendable() {
        let mut coins = three_coins();
        coins.remove(1);
        coins.add_output(1, data_carrier());
        assert!(!coins.has(1));

        coins.add_output(1, spendable(500, 9));
        assert!(coins.is_unspent(1));
    }

    #[test]
    fn test_add_coin_reinstates_at_its_own_index() {
        let mut coins = three_coins();
        let coin = coins.coin(1).unwrap().unwrap();
        coins.remove(1);
        assert!(!coins.has(1));

        coins.add_coin(coin);
        assert!(coins.is_unspent(1));
        assert_eq!(coins.coin(1).unwrap().unwrap().value(), 2_000);
    }

    #[test]
    fn test_add_coin_rejects_unspendable() {
        let mut coins = three_coins();
        coins.remove(1);
        coins.add_coin(Coin {
            outpoint: OutPoint {
                txid: coins.txid(),
                vout: 1,
            },
            version: 2,
            height: Some(1),
            is_coinbase: false,
            output: data_carrier(),
        });
        assert!(!coins.has(1));
    }

    #[test]
    #[should_panic(expected = "already occupied")]
    fn test_add_to_an_occupied_slot_is_fatal() {
        let mut coins = three_coins();
        coins.add(0, CoinEntry::from_output(spendable(1, 1)));
    }

    #[test]
    fn test_coin_materialization() {
        let mut coins = three_coins();
        let coin = coins.coin(2).unwrap().unwrap();
        assert_eq!(coin.outpoint.vout, 2);
        assert_eq!(coin.outpoint.txid, coins.txid());
        assert_eq!(coin.height, Some(1));
        assert_eq!(coin.value(), 3_000);
        assert!(coins.coin(7).unwrap().is_none());
    }
}
