//! Compressed serialization of transaction outputs.
//!
//! Stored coins use Bitcoin Core's exponent/digit packing for amounts and a
//! template short form for standard scripts, so a persisted output costs a
//! fraction of its consensus encoding. The format is self-delimiting: a
//! reader always knows where one compressed output ends.

mod script;
mod var_int;

use bitcoin::consensus::encode::{self, Decodable, Encodable};
use bitcoin::{Amount, TxOut, io};

pub use self::var_int::VarInt;

const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Packs `n` satoshis into a small integer.
///
/// Most real amounts are round numbers, so the trailing decimal zeros are
/// folded into an exponent. Defined for `0 <= n <= MAX_MONEY`.
pub fn compress_amount(n: u64) -> u64 {
    assert!(n <= MAX_MONEY);

    if n == 0 {
        return 0;
    }
    let mut n = n;
    let mut e = 0u64;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }
    if e < 9 {
        let d = n % 10;
        debug_assert!((1..=9).contains(&d));
        n /= 10;
        1 + (n * 9 + d - 1) * 10 + e
    } else {
        1 + (n - 1) * 10 + 9
    }
}

/// Inverse of [`compress_amount`].
pub fn decompress_amount(x: u64) -> u64 {
    if x == 0 {
        return 0;
    }
    let mut x = x - 1;
    let e = x % 10;
    x /= 10;
    let mut n = if e < 9 {
        let d = (x % 9) + 1;
        x /= 9;
        x * 10 + d
    } else {
        x + 1
    };
    for _ in 0..e {
        n *= 10;
    }
    n
}

/// A transaction output in its compressed storage form.
///
/// Layout: `varint(compressed amount) ‖ compressed script`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedTxOut(pub TxOut);

impl Encodable for CompressedTxOut {
    fn consensus_encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        encode_txout(&self.0, writer)
    }
}

impl Decodable for CompressedTxOut {
    fn consensus_decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, encode::Error> {
        decode_txout(reader).map(Self)
    }
}

/// Writes `output` in compressed form.
pub fn encode_txout<W: io::Write + ?Sized>(
    output: &TxOut,
    writer: &mut W,
) -> Result<usize, io::Error> {
    let mut len = VarInt(compress_amount(output.value.to_sat())).consensus_encode(writer)?;
    len += script::encode_script(&output.script_pubkey, writer)?;
    Ok(len)
}

/// Reads an output written by [`encode_txout`].
pub fn decode_txout<R: io::Read + ?Sized>(reader: &mut R) -> Result<TxOut, encode::Error> {
    let value = Amount::from_sat(decompress_amount(VarInt::consensus_decode(reader)?.0));
    let script_pubkey = script::decode_script(reader)?;
    Ok(TxOut {
        value,
        script_pubkey,
    })
}

/// Exact serialized length of `output` in compressed form.
pub fn compressed_size(output: &TxOut) -> usize {
    VarInt(compress_amount(output.value.to_sat())).size()
        + script::compressed_size(&output.script_pubkey)
}
