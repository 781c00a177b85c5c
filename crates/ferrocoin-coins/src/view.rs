//! Aggregating snapshot of the coins touched by one validation session.

use std::collections::HashMap;

use bitcoin::consensus::encode::{self, Decodable, Encodable};
use bitcoin::{OutPoint, Transaction, TxOut, Txid};

use crate::coin::{Coin, is_unspendable};
use crate::coin_entry::CoinEntry;
use crate::coins::Coins;
use crate::error::Result;
use crate::store::CoinStore;
use crate::undo::UndoCoins;

/// A session-scoped overlay on the persistent coin set.
///
/// The view caches every transaction it touches, reading through to the
/// backing [`CoinStore`] at most once per missing coin, and records each
/// spend in a shared [`UndoCoins`] so the session can be reversed during a
/// reorg. It is built for exactly one owner making sequential calls: one
/// view per block or transaction being validated, processed in canonical
/// order, then discarded.
///
/// Iteration and persisted order of the cached transactions is
/// unspecified; only the per-transaction serialized form of
/// [`CoinView::encode_inputs`] carries a significant order.
#[derive(Debug, Default)]
pub struct CoinView {
    map: HashMap<Txid, Coins>,
    undo: UndoCoins,
}

impl CoinView {
    pub fn new() -> Self {
        Self::default()
    }

    /// The undo log accumulated by this session's spends.
    pub fn undo(&self) -> &UndoCoins {
        &self.undo
    }

    /// Detaches the undo log, leaving an empty one behind.
    pub fn take_undo(&mut self) -> UndoCoins {
        std::mem::take(&mut self.undo)
    }

    pub fn get(&self, txid: &Txid) -> Option<&Coins> {
        self.map.get(txid)
    }

    pub fn get_mut(&mut self, txid: &Txid) -> Option<&mut Coins> {
        self.map.get_mut(txid)
    }

    pub fn has(&self, txid: &Txid) -> bool {
        self.map.contains_key(txid)
    }

    /// Installs `coins`, replacing any bucket cached for the same
    /// transaction.
    pub fn add(&mut self, coins: Coins) -> &mut Coins {
        let txid = coins.txid();
        self.map.insert(txid, coins);
        self.map.get_mut(&txid).expect("bucket inserted above; qed")
    }

    /// Drops the cached bucket for `txid`.
    pub fn remove(&mut self, txid: &Txid) -> Option<Coins> {
        self.map.remove(txid)
    }

    /// Installs the full output set of `tx`.
    pub fn add_tx(&mut self, tx: &Transaction, height: Option<u32>) -> &mut Coins {
        self.add(Coins::from_tx(tx, height))
    }

    /// Installs the output set of `tx` with every entry already marked
    /// spent.
    ///
    /// Used for a disconnected transaction whose outputs are invalidated
    /// while their index layout must be preserved.
    pub fn remove_tx(&mut self, tx: &Transaction, height: Option<u32>) -> &mut Coins {
        let mut coins = Coins::from_tx(tx, height);
        coins.mark_all_spent();
        self.add(coins)
    }

    /// Inserts a single entry at `outpoint`, creating the owning bucket on
    /// demand.
    ///
    /// An occupied slot is left untouched: first write wins. Returns
    /// whether the entry was installed.
    pub fn add_entry(&mut self, outpoint: OutPoint, entry: CoinEntry) -> bool {
        let coins = self.ensure(outpoint.txid);
        if coins.has(outpoint.vout) {
            return false;
        }
        coins.add(outpoint.vout, entry);
        true
    }

    /// Inserts a materialized coin; unspendable coins are silently dropped.
    pub fn add_coin(&mut self, coin: Coin) -> bool {
        if is_unspendable(&coin.output.script_pubkey) {
            return false;
        }
        let outpoint = coin.outpoint;
        self.add_entry(outpoint, CoinEntry::from_coin(coin))
    }

    /// Inserts a bare output at `outpoint`; unspendable outputs are
    /// silently dropped.
    pub fn add_output(&mut self, outpoint: OutPoint, output: TxOut) -> bool {
        if is_unspendable(&output.script_pubkey) {
            return false;
        }
        self.add_entry(outpoint, CoinEntry::from_output(output))
    }

    /// Spends the coin at `outpoint`, recording its prior state for undo.
    ///
    /// Returns `false`, with no state change and no undo push, when the
    /// coin is missing or already spent; callers treat that as an invalid
    /// spend attempt and reject the transaction.
    pub fn spend_output(&mut self, outpoint: &OutPoint) -> bool {
        match self.map.get_mut(&outpoint.txid) {
            Some(coins) => Self::spend_from(&mut self.undo, coins, outpoint.vout),
            None => false,
        }
    }

    /// Deletes the coin at `outpoint` outright, without undo bookkeeping.
    pub fn remove_output(&mut self, outpoint: &OutPoint) -> Option<CoinEntry> {
        self.map.get_mut(&outpoint.txid)?.remove(outpoint.vout)
    }

    fn spend_from(undo: &mut UndoCoins, coins: &mut Coins, index: u32) -> bool {
        match coins.spend(index) {
            Some(entry) => {
                undo.push(entry);
                true
            }
            None => false,
        }
    }

    /// Reinstates `entry` at `outpoint`, replacing any spent tombstone.
    pub(crate) fn restore_entry(&mut self, outpoint: OutPoint, entry: CoinEntry) {
        let coins = self.ensure(outpoint.txid);
        if coins.has(outpoint.vout) {
            coins.remove(outpoint.vout);
        }
        coins.add(outpoint.vout, entry);
    }

    fn ensure(&mut self, txid: Txid) -> &mut Coins {
        self.map.entry(txid).or_insert_with(|| Coins::new(txid))
    }

    /// The cached entry at `outpoint`, spent tombstones included.
    pub fn entry(&self, outpoint: &OutPoint) -> Option<&CoinEntry> {
        self.map.get(&outpoint.txid)?.get(outpoint.vout)
    }

    pub fn has_entry(&self, outpoint: &OutPoint) -> bool {
        self.entry(outpoint).is_some()
    }

    /// The decoded output at `outpoint`, if cached.
    pub fn output(&mut self, outpoint: &OutPoint) -> Result<Option<&TxOut>> {
        match self.map.get_mut(&outpoint.txid) {
            Some(coins) => coins.output(outpoint.vout),
            None => Ok(None),
        }
    }

    /// A materialized [`Coin`] for `outpoint`, if cached.
    pub fn coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        match self.map.get_mut(&outpoint.txid) {
            Some(coins) => coins.coin(outpoint.vout),
            None => Ok(None),
        }
    }

    /// Confirmation height of the coin at `outpoint`; `None` when the coin
    /// is unknown or unconfirmed.
    pub fn coin_height(&self, outpoint: &OutPoint) -> Option<u32> {
        self.entry(outpoint)?.height
    }

    /// Whether the coin at `outpoint` was created by a coinbase; `false`
    /// when the coin is unknown.
    pub fn is_coinbase(&self, outpoint: &OutPoint) -> bool {
        self.entry(outpoint).is_some_and(|entry| entry.coinbase)
    }

    /// Fetches the coin at `prevout` through the view.
    ///
    /// A cached entry is served from the map; otherwise exactly one store
    /// lookup is issued and a hit is installed before returning. `None`
    /// means the coin does not exist; nothing is cached in that case, and
    /// earlier successful lookups stay valid.
    pub async fn read_coin<S: CoinStore + ?Sized>(
        &mut self,
        store: &S,
        prevout: &OutPoint,
    ) -> Option<&Coins> {
        if !self.has_entry(prevout) {
            let entry = store.read_coin(prevout).await?;
            tracing::trace!("Fetched coin {prevout} from the backing store");
            self.add_entry(*prevout, entry);
        }
        self.map
            .get(&prevout.txid)
            .filter(|coins| coins.has(prevout.vout))
    }

    /// Read-through-loads every input of `tx`.
    ///
    /// Every input is attempted even after a miss, so the session caches
    /// as much as it can resolve. The result is `false` when any input's
    /// coin is unknown, meaning `tx` spends something that does not exist.
    pub async fn ensure_inputs<S: CoinStore + ?Sized>(
        &mut self,
        store: &S,
        tx: &Transaction,
    ) -> bool {
        let mut resolved = true;
        for input in &tx.input {
            if self.read_coin(store, &input.previous_output).await.is_none() {
                resolved = false;
            }
        }
        resolved
    }

    /// Loads and immediately spends every input of `tx`, in input order.
    ///
    /// Stops at the first input that cannot be resolved or was already
    /// spent. Spends applied before the failure stay applied: on `false`
    /// the caller must discard the whole view rather than attempt partial
    /// recovery.
    pub async fn spend_inputs<S: CoinStore + ?Sized>(
        &mut self,
        store: &S,
        tx: &Transaction,
    ) -> bool {
        for input in &tx.input {
            let prevout = input.previous_output;
            if self.read_coin(store, &prevout).await.is_none() || !self.spend_output(&prevout) {
                tracing::debug!("Input {prevout} refers to a missing or spent coin");
                return false;
            }
        }
        true
    }

    /// Serialized size of the per-transaction form for `tx`.
    pub fn encoded_inputs_size(&self, tx: &Transaction) -> usize {
        tx.input
            .iter()
            .map(|input| 1 + self.entry(&input.previous_output).map_or(0, CoinEntry::size))
            .sum()
    }

    /// Serializes only the coins backing `tx`'s inputs, in input order.
    ///
    /// One byte per input: `0` when no coin is cached for it, `1` followed
    /// by the coin's record otherwise. The layout is positionally coupled
    /// to `tx`, so decoding requires the same transaction with the same
    /// input order. This keeps a cached validation context small without
    /// retaining the whole view.
    pub fn encode_inputs(&self, tx: &Transaction) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.encoded_inputs_size(tx));
        for input in &tx.input {
            match self.entry(&input.previous_output) {
                Some(entry) => {
                    data.push(1);
                    entry
                        .consensus_encode(&mut data)
                        .expect("in-memory serialization cannot fail; qed");
                }
                None => data.push(0),
            }
        }
        data
    }

    /// Rebuilds a view holding the coins recorded for `tx`'s inputs.
    ///
    /// `tx` must be the transaction `data` was encoded against.
    pub fn decode_inputs(tx: &Transaction, data: &[u8]) -> Result<Self> {
        let mut reader = data;
        let mut view = Self::new();
        for input in &tx.input {
            match u8::consensus_decode(&mut reader)? {
                0 => {}
                1 => {
                    let entry = CoinEntry::consensus_decode(&mut reader)?;
                    view.add_entry(input.previous_output, entry);
                }
                _ => return Err(encode::Error::ParseFailed("invalid coin presence flag").into()),
            }
        }
        Ok(view)
    }
}
