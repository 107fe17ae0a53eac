//! Primitive wire codec: little-endian integers, varints, hashing and byte order
//!
//! Hashes travel on the wire in "internal" (little-endian) order. Every [`Hash`]
//! held by this crate is in "display" order, the reversed form shown by block
//! explorers. [`Reader::read_hash`] and [`write_hash`] convert at the boundary.

use crate::error::{InquisitorError, Result};
use crate::types::Hash;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Varint prefix announcing a 2-byte little-endian value.
const VARINT_U16: u8 = 0xfd;
/// Varint prefix announcing a 4-byte little-endian value.
const VARINT_U32: u8 = 0xfe;
/// Varint prefix announcing an 8-byte little-endian value.
const VARINT_U64: u8 = 0xff;

/// DecodeVarInt: 𝔹* → ℕ × ℕ
///
/// 1. first < 253: value = first, 1 byte consumed
/// 2. first = 253: value = next 2 bytes LE, 3 bytes consumed
/// 3. first = 254: value = next 4 bytes LE, 5 bytes consumed
/// 4. first = 255: value = next 8 bytes LE, 9 bytes consumed
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut reader = Reader::new(bytes);
    let value = reader.read_varint()?;
    Ok((value, reader.position()))
}

/// EncodeVarInt: ℕ → 𝔹*, the exact inverse of [`decode_varint`].
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    write_varint(&mut out, value);
    out
}

pub fn write_varint(out: &mut Vec<u8>, value: u64) {
    if value < VARINT_U16 as u64 {
        out.push(value as u8);
    } else if value <= u16::MAX as u64 {
        out.push(VARINT_U16);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= u32::MAX as u64 {
        out.push(VARINT_U32);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(VARINT_U64);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Append a display-order hash in wire (internal) order.
pub fn write_hash(out: &mut Vec<u8>, hash: &Hash) {
    out.extend(hash.iter().rev());
}

/// Reverse a 32-byte hash between display and internal order.
pub fn reversed(hash: &Hash) -> Hash {
    let mut out = *hash;
    out.reverse();
    out
}

/// SHA256(x)
pub fn sha256(data: &[u8]) -> Hash {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// SHA256(SHA256(x)), in internal order.
pub fn double_sha256(data: &[u8]) -> Hash {
    sha256(&sha256(data))
}

/// RIPEMD160(x)
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(data));
    out
}

/// Hash160: RIPEMD160(SHA256(x))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

/// Lower-case hex of a display-order hash.
pub fn hash_to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Parse a 64-character hex string as a display-order hash.
pub fn hash_from_hex(s: &str) -> Result<Hash> {
    let bytes = hex::decode(s)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| InquisitorError::InvalidHex(format!("expected 32 bytes, got {}", bytes.len())))
}

/// Forward-only cursor over a byte slice.
///
/// Every read checks the remaining length first and fails with
/// [`InquisitorError::TruncatedInput`] instead of panicking.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The bytes between `start` and the current position.
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.bytes[start..self.pos]
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(InquisitorError::TruncatedInput {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Read a 32-byte wire hash and return it in display order.
    pub fn read_hash(&mut self) -> Result<Hash> {
        let mut hash: Hash = self.take_array()?;
        hash.reverse();
        Ok(hash)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        match self.read_u8()? {
            VARINT_U16 => Ok(self.read_u16_le()? as u64),
            VARINT_U32 => Ok(self.read_u32_le()? as u64),
            VARINT_U64 => self.read_u64_le(),
            small => Ok(small as u64),
        }
    }

    /// Read a varint used as a length or count.
    pub fn read_varint_len(&mut self) -> Result<usize> {
        usize::try_from(self.read_varint()?).map_err(|_| InquisitorError::VarIntTooLarge)
    }

    /// Read a varint length followed by that many bytes.
    pub fn read_var_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint_len()?;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        let cases: [(u64, &str); 7] = [
            (0, "00"),
            (252, "fc"),
            (253, "fdfd00"),
            (0xffff, "fdffff"),
            (0x10000, "fe00000100"),
            (0xffff_ffff, "feffffffff"),
            (0x1_0000_0000, "ff0000000001000000"),
        ];
        for (value, expected) in cases {
            let encoded = encode_varint(value);
            assert_eq!(hex::encode(&encoded), expected);
            assert_eq!(decode_varint(&encoded).unwrap(), (value, encoded.len()));
        }
    }

    #[test]
    fn test_varint_truncated() {
        assert_eq!(
            decode_varint(&[0xfd, 0x01]),
            Err(InquisitorError::TruncatedInput { needed: 2, available: 1 })
        );
        assert!(decode_varint(&[]).is_err());
        assert!(decode_varint(&[0xff, 0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_varint_ignores_trailing_bytes() {
        assert_eq!(decode_varint(&[0x05, 0xaa, 0xbb]).unwrap(), (5, 1));
    }

    #[test]
    fn test_double_sha256_empty() {
        assert_eq!(
            hex::encode(double_sha256(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_hash160_known_vector() {
        // Genesis coinbase output key
        let pubkey = hex::decode(
            "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f",
        )
        .unwrap();
        assert_eq!(hex::encode(hash160(&pubkey)), "62e907b15cbf27d5425399ebf6f0fb50ebb88f18");
    }

    #[test]
    fn test_reader_hash_is_display_order() {
        let mut wire = [0u8; 32];
        wire[0] = 0x01;
        let mut reader = Reader::new(&wire);
        let hash = reader.read_hash().unwrap();
        assert_eq!(hash[31], 0x01);
        let mut out = Vec::new();
        write_hash(&mut out, &hash);
        assert_eq!(out, wire.to_vec());
    }

    #[test]
    fn test_reader_truncation() {
        let mut reader = Reader::new(&[1, 2, 3]);
        assert_eq!(reader.read_u16_le().unwrap(), 0x0201);
        assert!(reader.read_u32_le().is_err());
        // A failed read leaves the cursor untouched
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.read_u8().unwrap(), 3);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_hash_hex_roundtrip_and_errors() {
        let hex_str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
        let hash = hash_from_hex(hex_str).unwrap();
        assert_eq!(hash_to_hex(&hash), hex_str);
        assert!(hash_from_hex("00ff").is_err());
        assert!(hash_from_hex("zz").is_err());
    }
}
