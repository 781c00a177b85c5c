//! Fully resolved coins, detached from the view.

use bitcoin::{OutPoint, Script, TxOut};

/// Consensus limit on the size of a script pubkey.
const MAX_SCRIPT_SIZE: usize = 10_000;

/// An unspent output together with the metadata of its creating
/// transaction, materialized for consumption outside the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    /// Location of the output.
    pub outpoint: OutPoint,
    /// Version of the transaction that created the output.
    pub version: u32,
    /// Height of the confirming block, `None` while unconfirmed.
    pub height: Option<u32>,
    /// Whether the creating transaction is a coinbase.
    pub is_coinbase: bool,
    /// The output itself.
    pub output: TxOut,
}

impl Coin {
    /// Amount of the output in satoshis.
    pub fn value(&self) -> u64 {
        self.output.value.to_sat()
    }
}

/// Whether a script can never be spent.
///
/// Such outputs are dropped before they ever enter a view: an `OP_RETURN`
/// data carrier or a script past the consensus size limit.
pub fn is_unspendable(script: &Script) -> bool {
    script.len() > MAX_SCRIPT_SIZE || script.is_op_return()
}
