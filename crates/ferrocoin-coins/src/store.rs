//! Backing stores a view reads through to.

use std::collections::HashMap;

use bitcoin::OutPoint;

use crate::coin_entry::CoinEntry;

/// Read access to a persistent coin set.
///
/// A missing coin is a routine outcome, not an error: the store answers
/// `None` both for coins that never existed and for coins already spent
/// and pruned. Infrastructure failures belong to the implementation and
/// should be surfaced through its own channels before answering.
#[async_trait::async_trait]
pub trait CoinStore: Send + Sync {
    /// Looks up the coin at `outpoint`.
    async fn read_coin(&self, outpoint: &OutPoint) -> Option<CoinEntry>;
}

/// An in-memory coin set, primarily for tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    coins: HashMap<OutPoint, CoinEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, outpoint: OutPoint, entry: CoinEntry) {
        self.coins.insert(outpoint, entry);
    }

    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<CoinEntry> {
        self.coins.remove(outpoint)
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}

#[async_trait::async_trait]
impl CoinStore for MemoryStore {
    async fn read_coin(&self, outpoint: &OutPoint) -> Option<CoinEntry> {
        self.coins.get(outpoint).cloned()
    }
}
