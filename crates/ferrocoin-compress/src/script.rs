//! Short forms for the standard script templates.
//!
//! P2PKH, P2SH and P2PK outputs dominate the UTXO set, so they are stored
//! as a one-byte tag plus the hash or x coordinate. Everything else falls
//! back to a length-prefixed copy of the raw script, with the length offset
//! past the reserved tag range.

use bitcoin::consensus::encode::{self, Decodable, Encodable};
use bitcoin::hashes::Hash;
use bitcoin::io;
use bitcoin::opcodes::all::{OP_CHECKSIG, OP_PUSHBYTES_33, OP_PUSHBYTES_65};
use bitcoin::{PubkeyHash, PublicKey, Script, ScriptBuf, ScriptHash};

use crate::var_int::VarInt;

/// Tags `0x00..=0x05` select a template; larger values carry a raw script.
const SPECIAL_SCRIPTS: u64 = 6;

/// Consensus limit on the size of a script pubkey.
const MAX_SCRIPT_SIZE: usize = 10_000;

fn pubkey_hash(script: &[u8]) -> Option<[u8; 20]> {
    match script {
        // OP_DUP OP_HASH160 <20> hash OP_EQUALVERIFY OP_CHECKSIG
        [0x76, 0xa9, 20, hash @ .., 0x88, 0xac] if hash.len() == 20 => hash.try_into().ok(),
        _ => None,
    }
}

fn script_hash(script: &[u8]) -> Option<[u8; 20]> {
    match script {
        // OP_HASH160 <20> hash OP_EQUAL
        [0xa9, 20, hash @ .., 0x87] if hash.len() == 20 => hash.try_into().ok(),
        _ => None,
    }
}

fn pubkey(script: &[u8]) -> Option<&[u8]> {
    match script {
        // <33> pubkey OP_CHECKSIG
        [33, key @ .., 0xac] if key.len() == 33 && (key[0] == 0x02 || key[0] == 0x03) => Some(key),
        // <65> pubkey OP_CHECKSIG. Only a key that actually lies on the
        // curve can be rebuilt from its x coordinate on decode.
        [65, key @ .., 0xac] if key.len() == 65 && key[0] == 0x04 => {
            PublicKey::from_slice(key).is_ok().then_some(key)
        }
        _ => None,
    }
}

/// Returns the template form of `script`, tag byte included, if it has one.
fn compress(script: &[u8]) -> Option<Vec<u8>> {
    if let Some(hash) = pubkey_hash(script) {
        let mut out = Vec::with_capacity(21);
        out.push(0x00);
        out.extend_from_slice(&hash);
        return Some(out);
    }

    if let Some(hash) = script_hash(script) {
        let mut out = Vec::with_capacity(21);
        out.push(0x01);
        out.extend_from_slice(&hash);
        return Some(out);
    }

    if let Some(key) = pubkey(script) {
        let mut out = Vec::with_capacity(33);
        match key.len() {
            33 => out.push(key[0]),
            // The y parity rides in the tag so the decoder can recover the
            // full point.
            _ => out.push(0x04 | (key[64] & 0x01)),
        }
        out.extend_from_slice(&key[1..33]);
        return Some(out);
    }

    None
}

pub(crate) fn encode_script<W: io::Write + ?Sized>(
    script: &Script,
    writer: &mut W,
) -> Result<usize, io::Error> {
    if let Some(short) = compress(script.as_bytes()) {
        writer.write_all(&short)?;
        return Ok(short.len());
    }

    let mut len = VarInt(script.len() as u64 + SPECIAL_SCRIPTS).consensus_encode(writer)?;
    writer.write_all(script.as_bytes())?;
    len += script.len();
    Ok(len)
}

/// Exact serialized length of `script` in compressed form.
pub(crate) fn compressed_size(script: &Script) -> usize {
    match compress(script.as_bytes()) {
        Some(short) => short.len(),
        None => VarInt(script.len() as u64 + SPECIAL_SCRIPTS).size() + script.len(),
    }
}

pub(crate) fn decode_script<R: io::Read + ?Sized>(
    reader: &mut R,
) -> Result<ScriptBuf, encode::Error> {
    let tag = VarInt::consensus_decode(reader)?.0;
    match tag {
        0x00 => {
            let mut hash = [0u8; 20];
            reader.read_exact(&mut hash)?;
            Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)))
        }
        0x01 => {
            let mut hash = [0u8; 20];
            reader.read_exact(&mut hash)?;
            Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash)))
        }
        0x02 | 0x03 => {
            let mut x = [0u8; 32];
            reader.read_exact(&mut x)?;

            let mut script = Vec::with_capacity(35);
            script.push(OP_PUSHBYTES_33.to_u8());
            script.push(tag as u8);
            script.extend_from_slice(&x);
            script.push(OP_CHECKSIG.to_u8());
            Ok(ScriptBuf::from_bytes(script))
        }
        0x04 | 0x05 => {
            let mut x = [0u8; 32];
            reader.read_exact(&mut x)?;

            let mut compressed = Vec::with_capacity(33);
            compressed.push(tag as u8 - 2);
            compressed.extend_from_slice(&x);
            let key = PublicKey::from_slice(&compressed)
                .map_err(|_| encode::Error::ParseFailed("pubkey is not on the curve"))?;

            let mut script = Vec::with_capacity(67);
            script.push(OP_PUSHBYTES_65.to_u8());
            script.extend_from_slice(&key.inner.serialize_uncompressed());
            script.push(OP_CHECKSIG.to_u8());
            Ok(ScriptBuf::from_bytes(script))
        }
        _ => {
            let len = (tag - SPECIAL_SCRIPTS) as usize;
            if len > MAX_SCRIPT_SIZE {
                return Err(encode::Error::ParseFailed(
                    "script exceeds the consensus size limit",
                ));
            }
            let mut script = vec![0u8; len];
            reader.read_exact(&mut script)?;
            Ok(ScriptBuf::from_bytes(script))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(script: ScriptBuf) -> ScriptBuf {
        let mut data = Vec::new();
        let written = encode_script(&script, &mut data).unwrap();
        assert_eq!(written, data.len());
        assert_eq!(data.len(), compressed_size(&script));
        let mut reader = data.as_slice();
        let decoded = decode_script(&mut reader).unwrap();
        assert!(reader.is_empty());
        decoded
    }

    #[test]
    fn test_p2pkh_compresses_to_21_bytes() {
        let script = ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([0xab; 20]));
        assert_eq!(compressed_size(&script), 21);
        assert_eq!(roundtrip(script.clone()), script);
    }

    #[test]
    fn test_p2sh_compresses_to_21_bytes() {
        let script = ScriptBuf::new_p2sh(&ScriptHash::from_byte_array([0xcd; 20]));
        assert_eq!(compressed_size(&script), 21);
        assert_eq!(roundtrip(script.clone()), script);
    }

    #[test]
    fn test_compressed_p2pk_roundtrip() {
        let mut bytes = vec![33, 0x02];
        bytes.extend_from_slice(&[0x11; 32]);
        bytes.push(OP_CHECKSIG.to_u8());
        let script = ScriptBuf::from_bytes(bytes);
        assert_eq!(compressed_size(&script), 33);
        assert_eq!(roundtrip(script.clone()), script);
    }

    #[test]
    fn test_uncompressed_p2pk_roundtrip() {
        // The genesis block's P2PK output.
        let script = ScriptBuf::from_bytes(
            hex::decode(
                "4104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61de\
                 b649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac",
            )
            .unwrap(),
        );
        assert_eq!(compressed_size(&script), 33);
        assert_eq!(roundtrip(script.clone()), script);
    }

    #[test]
    fn test_nonstandard_script_stored_raw() {
        // OP_TRUE: no template applies.
        let script = ScriptBuf::from_bytes(vec![0x51]);
        assert_eq!(compressed_size(&script), 2);
        assert_eq!(roundtrip(script.clone()), script);
    }

    #[test]
    fn test_oversized_script_rejected_on_decode() {
        let mut data = Vec::new();
        VarInt(MAX_SCRIPT_SIZE as u64 + SPECIAL_SCRIPTS + 1)
            .consensus_encode(&mut data)
            .unwrap();
        data.extend_from_slice(&[0u8; 64]);
        assert!(decode_script(&mut data.as_slice()).is_err());
    }
}
