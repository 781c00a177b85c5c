//! Error types for the coin view subsystem.

/// Errors surfaced when decoding persisted coin data.
///
/// Expected domain outcomes such as a missing coin, an already-spent coin
/// or an unspendable output are communicated through `Option`/`bool`
/// returns; an `Error` always means the bytes themselves are unusable and
/// must not be mistaken for a normal miss.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or truncated coin record.
    #[error("failed to decode coin record: {0}")]
    Decode(#[from] bitcoin::consensus::encode::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
