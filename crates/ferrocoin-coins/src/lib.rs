//! UTXO view layer.
//!
//! The types in this crate sit between transaction validation and the
//! persistent coin database:
//!
//! - [`CoinEntry`] is one output record in its packed storage form, with
//!   its serialized bytes and decoded output memoized independently.
//! - [`Coins`] groups the entries of one transaction by output index,
//!   keeping indexes stable through spends and removals.
//! - [`CoinView`] is a session-scoped overlay that reads through to a
//!   [`CoinStore`] and records every spend in an [`UndoCoins`] log.
//! - [`UndoCoins`] replays recorded spends in reverse during a reorg.
//!
//! A validation session builds one view, resolves and spends the inputs of
//! the transactions it processes, then either commits the undo log or
//! throws the whole view away.

mod coin;
mod coin_entry;
mod coins;
mod error;
mod store;
mod undo;
mod view;


pub use self::coin::{Coin, is_unspendable};
pub use self::coin_entry::CoinEntry;
pub use self::coins::Coins;
pub use self::error::{Error, Result};
pub use self::store::{CoinStore, MemoryStore};
pub use self::undo::UndoCoins;
pub use self::view::CoinView;
