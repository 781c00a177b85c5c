use bitcoin::consensus::encode::{self, Decodable, Encodable};
use bitcoin::io;

/// Base-128 variable-length integer used throughout the compressed coin
/// format.
///
/// Each byte carries seven value bits, least significant group first, with
/// the high bit flagging a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt(pub u64);

impl From<u64> for VarInt {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl VarInt {
    /// Serialized length in bytes.
    pub fn size(&self) -> usize {
        let mut value = self.0;
        let mut len = 1;
        while value >= 0x80 {
            value >>= 7;
            len += 1;
        }
        len
    }
}

impl Encodable for VarInt {
    fn consensus_encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut value = self.0;
        let mut len = 0;
        while value >= 0x80 {
            writer.write_all(&[((value & 0x7f) | 0x80) as u8])?;
            value >>= 7;
            len += 1;
        }
        writer.write_all(&[value as u8])?;
        Ok(len + 1)
    }
}

impl Decodable for VarInt {
    fn consensus_decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, encode::Error> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = u8::consensus_decode(reader)?;
            let group = u64::from(byte & 0x7f);
            if shift > 63 || group << shift >> shift != group {
                return Err(encode::Error::ParseFailed("varint exceeds 64 bits"));
            }
            value |= group << shift;
            if byte & 0x80 == 0 {
                return Ok(Self(value));
            }
            shift += 7;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u64) -> Vec<u8> {
        let mut data = Vec::new();
        VarInt(value).consensus_encode(&mut data).unwrap();
        data
    }

    #[test]
    fn test_varint_known_encodings() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(0x7f), vec![0x7f]);
        assert_eq!(encode(0x80), vec![0x80, 0x01]);
        assert_eq!(encode(0x3fff), vec![0xff, 0x7f]);
    }

    #[test]
    fn test_varint_roundtrip_and_size() {
        for value in [0, 1, 0x7f, 0x80, 0x4000, u64::from(u32::MAX), u64::MAX] {
            let data = encode(value);
            assert_eq!(data.len(), VarInt(value).size());
            let decoded = VarInt::consensus_decode(&mut data.as_slice()).unwrap();
            assert_eq!(decoded.0, value);
        }
    }

    #[test]
    fn test_varint_rejects_overflow() {
        // Eleven continuation groups push past 64 bits.
        let data = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f];
        assert!(VarInt::consensus_decode(&mut data.as_slice()).is_err());
    }
}
