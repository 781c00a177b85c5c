//! A single output record in its packed storage form.

use bitcoin::consensus::encode::{self, Decodable, Encodable, VarInt};
use bitcoin::{OutPoint, Transaction, TxOut, io};

use crate::coin::Coin;
use crate::error::Result;

/// Height field of the packed metadata word (bits 0-28).
const HEIGHT_MASK: u32 = 0x1fff_ffff;

/// Height value marking a coin that has not been confirmed yet.
const UNCONFIRMED: u32 = HEIGHT_MASK;

/// Bit position of the flag code within the packed word.
const CODE_SHIFT: u32 = 29;

/// Coinbase bit within the flag code.
const CODE_COINBASE: u32 = 1;

/// One unspent-or-spent output record.
///
/// Serialized layout, bit-exact:
/// `varint(version) ‖ u32le(packed word) ‖ compressed output`, where the
/// packed word carries the height in its low 29 bits (`0x1fffffff` for an
/// unconfirmed coin) and the coinbase flag in bit 29.
///
/// The record keeps its serialized bytes and its decoded output
/// independently: a coin read from storage holds only `raw` until somebody
/// asks for the output, and once either side is materialized it is
/// memoized. On the redemption hot path most coins are spent and
/// re-serialized without their output ever being decompressed.
#[derive(Debug, Clone)]
pub struct CoinEntry {
    /// Version of the creating transaction.
    pub version: u32,
    /// Height of the confirming block, `None` while unconfirmed.
    pub height: Option<u32>,
    /// Whether the creating transaction is a coinbase.
    pub coinbase: bool,
    /// Consumed during this session. In-memory only, never serialized.
    pub(crate) spent: bool,
    output: Option<TxOut>,
    raw: Option<Vec<u8>>,
}

impl CoinEntry {
    /// Wraps a bare output with default metadata.
    pub fn from_output(output: TxOut) -> Self {
        Self {
            version: 1,
            height: None,
            coinbase: false,
            spent: false,
            output: Some(output),
            raw: None,
        }
    }

    /// Rebuilds the entry backing a materialized [`Coin`].
    pub fn from_coin(coin: Coin) -> Self {
        Self {
            version: coin.version,
            height: coin.height,
            coinbase: coin.is_coinbase,
            spent: false,
            output: Some(coin.output),
            raw: None,
        }
    }

    /// Builds the entry for output `index` of `tx`.
    ///
    /// Panics if `index` is out of range.
    pub fn from_tx(tx: &Transaction, index: u32, height: Option<u32>) -> Self {
        let output = tx
            .output
            .get(index as usize)
            .expect("output index within the transaction")
            .clone();
        Self {
            version: tx.version.0 as u32,
            height,
            coinbase: tx.is_coinbase(),
            spent: false,
            output: Some(output),
            raw: None,
        }
    }

    /// Decodes the header of a persisted record, retaining the bytes.
    ///
    /// `data` must hold exactly one record. Output decompression is
    /// deferred until [`CoinEntry::output`] is called, so reading a coin
    /// does not pay for an output it never looks at.
    pub fn from_raw(data: Vec<u8>) -> Result<Self> {
        let (version, height, coinbase) = decode_header(&mut data.as_slice())?;
        Ok(Self {
            version,
            height,
            coinbase,
            spent: false,
            output: None,
            raw: Some(data),
        })
    }

    /// The decoded output, decompressing and memoizing on first access.
    pub fn output(&mut self) -> Result<&TxOut> {
        if self.output.is_none() {
            let raw = self
                .raw
                .as_ref()
                .expect("coin entry holds raw bytes or a decoded output");
            // Skip the header by re-reading it, so the output offset is
            // exactly what the header decode consumed.
            let mut reader = raw.as_slice();
            decode_header(&mut reader)?;
            let output = ferrocoin_compress::decode_txout(&mut reader)?;
            self.output = Some(output);
        }
        Ok(self.output.as_ref().expect("output decoded above; qed"))
    }

    /// Whether the coin was consumed during this session.
    pub fn is_spent(&self) -> bool {
        self.spent
    }

    /// Materializes a [`Coin`] for consumption outside the view.
    pub fn to_coin(&mut self, outpoint: OutPoint) -> Result<Coin> {
        Ok(Coin {
            outpoint,
            version: self.version,
            height: self.height,
            is_coinbase: self.coinbase,
            output: self.output()?.clone(),
        })
    }

    /// Serializes the entry, memoizing the bytes for later writes.
    pub fn to_raw(&mut self) -> &[u8] {
        if self.raw.is_none() {
            let mut data = Vec::with_capacity(self.size());
            self.consensus_encode(&mut data)
                .expect("in-memory serialization cannot fail; qed");
            self.raw = Some(data);
        }
        self.raw.as_deref().expect("raw cache populated above; qed")
    }

    /// Serialized length in bytes.
    pub fn size(&self) -> usize {
        match (&self.raw, &self.output) {
            (Some(raw), _) => raw.len(),
            (None, Some(output)) => {
                VarInt(u64::from(self.version)).size()
                    + 4
                    + ferrocoin_compress::compressed_size(output)
            }
            (None, None) => unreachable!("coin entry holds raw bytes or a decoded output"),
        }
    }

    fn packed_word(&self) -> u32 {
        let height = match self.height {
            Some(height) => {
                assert!(height < UNCONFIRMED, "coin height out of range");
                height
            }
            None => UNCONFIRMED,
        };
        let mut code = 0;
        if self.coinbase {
            code |= CODE_COINBASE;
        }
        (code << CODE_SHIFT) | height
    }
}

fn decode_header<R: io::Read + ?Sized>(
    reader: &mut R,
) -> std::result::Result<(u32, Option<u32>, bool), encode::Error> {
    let version = u32::try_from(VarInt::consensus_decode(reader)?.0)
        .map_err(|_| encode::Error::ParseFailed("coin version exceeds 32 bits"))?;
    let word = u32::consensus_decode(reader)?;
    let height = match word & HEIGHT_MASK {
        UNCONFIRMED => None,
        height => Some(height),
    };
    let coinbase = (word >> CODE_SHIFT) & CODE_COINBASE != 0;
    Ok((version, height, coinbase))
}

impl Encodable for CoinEntry {
    fn consensus_encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        // Cached bytes are authoritative and written back verbatim.
        if let Some(raw) = &self.raw {
            writer.write_all(raw)?;
            return Ok(raw.len());
        }

        let output = self
            .output
            .as_ref()
            .expect("coin entry holds raw bytes or a decoded output");
        let mut len = VarInt(u64::from(self.version)).consensus_encode(writer)?;
        len += self.packed_word().consensus_encode(writer)?;
        len += ferrocoin_compress::encode_txout(output, writer)?;
        Ok(len)
    }
}

impl Decodable for CoinEntry {
    fn consensus_decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, encode::Error> {
        let (version, height, coinbase) = decode_header(reader)?;
        let output = ferrocoin_compress::decode_txout(reader)?;
        Ok(Self {
            version,
            height,
            coinbase,
            spent: false,
            output: Some(output),
            raw: None,
        })
    }
}
