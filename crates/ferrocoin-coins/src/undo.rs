//! Reverse-order replay log for spent coins.

use bitcoin::consensus::encode::{self, Decodable, Encodable};
use bitcoin::{OutPoint, io};

use crate::coin_entry::CoinEntry;
use crate::error::Result;
use crate::view::CoinView;

/// The coins removed by a sequence of spends, in spend order.
///
/// One blob is persisted per connected block; replaying it strictly in
/// reverse restores the pre-block state of the coin set during a reorg.
///
/// Serialized layout: `u32le(count) ‖ count × CoinEntry record`.
#[derive(Debug, Clone, Default)]
pub struct UndoCoins {
    items: Vec<CoinEntry>,
}

impl UndoCoins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the pre-spend state of a freshly spent coin.
    pub fn push(&mut self, entry: CoinEntry) {
        self.items.push(entry);
    }

    /// The most recent spend, without popping it.
    pub fn top(&self) -> Option<&CoinEntry> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serialized length in bytes.
    pub fn size(&self) -> usize {
        4 + self.items.iter().map(CoinEntry::size).sum::<usize>()
    }

    pub fn to_raw(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.size());
        self.consensus_encode(&mut data)
            .expect("in-memory serialization cannot fail; qed");
        data
    }

    pub fn from_raw(data: &[u8]) -> Result<Self> {
        Ok(Self::consensus_decode(&mut &*data)?)
    }

    /// Serializes the accumulated spends and resets the stack.
    ///
    /// Called once per connected block to flush the undo blob.
    pub fn commit(&mut self) -> Vec<u8> {
        let data = self.to_raw();
        tracing::debug!("Committed undo data for {} spends", self.items.len());
        self.items.clear();
        data
    }

    /// Pops the most recent spend and restores it into `view` at
    /// `outpoint`.
    ///
    /// Must be invoked exactly once per prior successful spend, in exact
    /// reverse chronological order. Panics if the stack is empty: popping
    /// past the recorded spends is a bookkeeping bug, not bad input.
    pub fn apply(&mut self, view: &mut CoinView, outpoint: OutPoint) {
        let mut entry = self
            .items
            .pop()
            .expect("undo stack must not be empty when applying");
        entry.spent = false;
        view.restore_entry(outpoint, entry);
    }
}

impl Encodable for UndoCoins {
    fn consensus_encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let count = u32::try_from(self.items.len()).expect("undo count fits in a u32; qed");
        let mut len = count.consensus_encode(writer)?;
        for entry in &self.items {
            len += entry.consensus_encode(writer)?;
        }
        Ok(len)
    }
}

impl Decodable for UndoCoins {
    fn consensus_decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, encode::Error> {
        let count = u32::consensus_decode(reader)?;
        // The count comes from untrusted bytes; bound the preallocation.
        let mut items = Vec::with_capacity((count as usize).min(1024));
        for _ in 0..count {
            items.push(CoinEntry::consensus_decode(reader)?);
        }
        Ok(Self { items })
    }
}
