//! Core blockchain types
//!
//! All [`Hash`] fields are held in display order; serialization writes them back
//! in wire order.

use crate::codec::{double_sha256, reversed, write_hash, write_varint};
use crate::constants::{COINBASE_INDEX, HEADER_SIZE};
use serde::{Deserialize, Serialize};

/// Hash type: 256-bit hash, display order
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// OutPoint: 𝒪 = ℍ × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    /// The coinbase sentinel: all-zero hash and index 0xffffffff.
    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.index == COINBASE_INDEX
    }
}

/// Transaction Input: ℐ = 𝒪 × 𝕊 × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script: ByteString,
    pub sequence: u32,
}

/// Transaction Output: 𝒯 = ℕ × 𝕊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Satoshis
    pub value: u64,
    pub script: ByteString,
}

/// Transaction: 𝒯𝒳 = ℤ × ℐ* × 𝒯* × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// A coinbase has exactly one input and that input spends the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Serialize: version ‖ |ins| ‖ ins ‖ |outs| ‖ outs ‖ lock_time
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize_into(&mut out);
        out
    }

    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(out, self.inputs.len() as u64);
        for input in &self.inputs {
            write_hash(out, &input.prevout.hash);
            out.extend_from_slice(&input.prevout.index.to_le_bytes());
            write_varint(out, input.script.len() as u64);
            out.extend_from_slice(&input.script);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_varint(out, output.script.len() as u64);
            out.extend_from_slice(&output.script);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }

    /// tx_hash = reverse(SHA256(SHA256(tx_bytes)))
    pub fn hash(&self) -> Hash {
        reversed(&double_sha256(&self.serialize()))
    }

    /// Sum of output values, `None` on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.value))
    }
}

/// Block Header: ℋ = ℤ × ℍ × ℍ × ℕ × ℕ × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub previous_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    /// Compact target; the high byte is the exponent
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// The fixed 80-byte header encoding.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(&self.version.to_le_bytes());
        write_hash(&mut out, &self.previous_block_hash);
        write_hash(&mut out, &self.merkle_root);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&out);
        header
    }

    /// block_hash = reverse(SHA256(SHA256(header80)))
    pub fn hash(&self) -> Hash {
        reversed(&double_sha256(&self.serialize()))
    }
}

/// Block: ℬ = ℋ × 𝒯𝒳*
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.header.serialize().to_vec();
        write_varint(&mut out, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.serialize_into(&mut out);
        }
        out
    }

    /// Transaction hashes in block order, display form.
    pub fn tx_hashes(&self) -> Vec<Hash> {
        self.transactions.iter().map(Transaction::hash).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                prevout: OutPoint { hash: [0u8; 32], index: COINBASE_INDEX },
                script: vec![0x51],
                sequence: 0xffffffff,
            }],
            outputs: vec![TxOut { value: 50, script: vec![0xac] }],
            lock_time: 0,
        }
    }

    #[test]
    fn test_coinbase_detection() {
        let mut tx = sample_tx();
        assert!(tx.is_coinbase());
        tx.inputs[0].prevout.index = 0;
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn test_transaction_layout() {
        let bytes = sample_tx().serialize();
        // version(4) + count(1) + outpoint(36) + len(1) + script(1) + seq(4)
        // + count(1) + value(8) + len(1) + script(1) + lock_time(4)
        assert_eq!(bytes.len(), 62);
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[37..41], &[0xff; 4]);
    }

    #[test]
    fn test_header_is_80_bytes() {
        let header = BlockHeader {
            version: 1,
            previous_block_hash: [0u8; 32],
            merkle_root: [0u8; 32],
            timestamp: 0,
            bits: 0x1d00ffff,
            nonce: 0,
        };
        let bytes = header.serialize();
        assert_eq!(&bytes[72..76], &[0xff, 0xff, 0x00, 0x1d]);
    }

    #[test]
    fn test_total_output_value_overflow() {
        let mut tx = sample_tx();
        tx.outputs.push(TxOut { value: u64::MAX, script: vec![] });
        assert_eq!(tx.total_output_value(), None);
    }
}
