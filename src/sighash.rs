//! Legacy signature hash (the preimage an ECDSA signature commits to)

use crate::error::{InquisitorError, Result};
use crate::script::Script;
use crate::types::Transaction;
use bitcoin_hashes::{sha256d, Hash as _};
use serde::{Deserialize, Serialize};

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// Digest returned for SIGHASH_SINGLE without a matching output: uint256(1) in
/// the byte order handed to ECDSA.
pub const SIGHASH_SINGLE_BUG: [u8; 32] = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

/// Which outputs a signature commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SighashBase {
    All,
    None,
    Single,
}

/// A decoded hashtype byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SighashType {
    pub base: SighashBase,
    pub anyone_can_pay: bool,
    /// The full value appended to the preimage
    pub raw: u32,
}

impl SighashType {
    /// Decode a hashtype. Undefined low bits fall back to ALL, as consensus does.
    pub fn from_u32(raw: u32) -> Self {
        let base = match raw & 0x1f {
            SIGHASH_NONE => SighashBase::None,
            SIGHASH_SINGLE => SighashBase::Single,
            _ => SighashBase::All,
        };
        SighashType {
            base,
            anyone_can_pay: raw & SIGHASH_ANYONECANPAY != 0,
            raw,
        }
    }

    /// True for ALL, NONE and SINGLE with or without ANYONECANPAY.
    pub fn is_defined(raw: u32) -> bool {
        matches!(raw & !SIGHASH_ANYONECANPAY, SIGHASH_ALL | SIGHASH_NONE | SIGHASH_SINGLE)
    }
}

/// SignatureHash: 𝒯𝒳 × ℕ × 𝒮𝒞 × ℕ → 𝔹³²
///
/// 1. Copy the transaction and empty every input script
/// 2. Put `script_code`, minus any OP_CODESEPARATOR, in the signed input
/// 3. NONE: drop every output; zero the other inputs' sequence numbers
/// 4. SINGLE: keep outputs up to the signed index, blanking the earlier ones
///    to value −1 with an empty script; zero the other inputs' sequence numbers
/// 5. ANYONECANPAY: keep only the signed input
/// 6. Serialize, append the hashtype as 4 LE bytes, and SHA256d the result
///
/// `script_code` is the executed script from its last OP_CODESEPARATOR with the
/// signature pushes already removed. The digest is returned in the byte order
/// ECDSA consumes, not reversed for display.
pub fn signature_hash(tx: &Transaction, input_index: usize, script_code: &Script, hash_type: u32) -> Result<[u8; 32]> {
    if input_index >= tx.inputs.len() {
        return Err(InquisitorError::InputIndexOutOfRange {
            index: input_index,
            inputs: tx.inputs.len(),
        });
    }
    let sighash_type = SighashType::from_u32(hash_type);

    if sighash_type.base == SighashBase::Single && input_index >= tx.outputs.len() {
        return Ok(SIGHASH_SINGLE_BUG);
    }

    let mut tx_copy = tx.clone();
    for input in tx_copy.inputs.iter_mut() {
        input.script.clear();
    }
    tx_copy.inputs[input_index].script = script_code.without_codeseparators().encode();

    match sighash_type.base {
        SighashBase::All => {}
        SighashBase::None => {
            tx_copy.outputs.clear();
            zero_other_sequences(&mut tx_copy, input_index);
        }
        SighashBase::Single => {
            tx_copy.outputs.truncate(input_index + 1);
            for output in tx_copy.outputs.iter_mut().take(input_index) {
                output.value = u64::MAX;
                output.script.clear();
            }
            zero_other_sequences(&mut tx_copy, input_index);
        }
    }

    if sighash_type.anyone_can_pay {
        let signed = tx_copy.inputs.swap_remove(input_index);
        tx_copy.inputs = vec![signed];
    }

    let mut preimage = tx_copy.serialize();
    preimage.extend_from_slice(&hash_type.to_le_bytes());
    Ok(sha256d::Hash::hash(&preimage).into_inner())
}

fn zero_other_sequences(tx: &mut Transaction, input_index: usize) {
    for (i, input) in tx.inputs.iter_mut().enumerate() {
        if i != input_index {
            input.sequence = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::double_sha256;
    use crate::types::{OutPoint, TxIn, TxOut};

    fn sample_tx() -> Transaction {
        let input = |n: u8| TxIn {
            prevout: OutPoint { hash: [n; 32], index: n as u32 },
            script: vec![0x51, n],
            sequence: 0xffff_fffe,
        };
        let output = |value: u64| TxOut {
            value,
            script: vec![0x76, 0xa9],
        };
        Transaction {
            version: 1,
            inputs: vec![input(1), input(2), input(3)],
            outputs: vec![output(10), output(20)],
            lock_time: 0,
        }
    }

    fn code() -> Script {
        Script::decode(&[0xab, 0x51, 0xac]).unwrap()
    }

    #[test]
    fn test_sighash_type_decoding() {
        let t = SighashType::from_u32(0x83);
        assert_eq!(t.base, SighashBase::Single);
        assert!(t.anyone_can_pay);
        assert_eq!(SighashType::from_u32(0x00).base, SighashBase::All);
        assert_eq!(SighashType::from_u32(0x22).base, SighashBase::None);
        assert!(SighashType::is_defined(0x81));
        assert!(!SighashType::is_defined(0x04));
        assert!(!SighashType::is_defined(0x21));
    }

    #[test]
    fn test_all_matches_manual_preimage() {
        let tx = sample_tx();
        let mut expected_tx = tx.clone();
        for input in expected_tx.inputs.iter_mut() {
            input.script.clear();
        }
        // Codeseparator stripped
        expected_tx.inputs[1].script = vec![0x51, 0xac];
        let mut preimage = expected_tx.serialize();
        preimage.extend_from_slice(&1u32.to_le_bytes());

        assert_eq!(signature_hash(&tx, 1, &code(), SIGHASH_ALL).unwrap(), double_sha256(&preimage));
    }

    #[test]
    fn test_modes_commit_to_different_data() {
        let tx = sample_tx();
        let all = signature_hash(&tx, 0, &code(), SIGHASH_ALL).unwrap();
        let none = signature_hash(&tx, 0, &code(), SIGHASH_NONE).unwrap();
        let single = signature_hash(&tx, 0, &code(), SIGHASH_SINGLE).unwrap();
        let acp = signature_hash(&tx, 0, &code(), SIGHASH_ALL | SIGHASH_ANYONECANPAY).unwrap();
        assert_ne!(all, none);
        assert_ne!(all, single);
        assert_ne!(all, acp);
        assert_ne!(none, single);
    }

    #[test]
    fn test_none_ignores_outputs() {
        let tx = sample_tx();
        let mut changed = tx.clone();
        changed.outputs[1].value = 99;
        changed.outputs.push(TxOut { value: 5, script: vec![] });
        assert_eq!(
            signature_hash(&tx, 0, &code(), SIGHASH_NONE).unwrap(),
            signature_hash(&changed, 0, &code(), SIGHASH_NONE).unwrap()
        );
        assert_ne!(
            signature_hash(&tx, 0, &code(), SIGHASH_ALL).unwrap(),
            signature_hash(&changed, 0, &code(), SIGHASH_ALL).unwrap()
        );
    }

    #[test]
    fn test_single_ignores_later_outputs() {
        let tx = sample_tx();
        let mut changed = tx.clone();
        changed.outputs[1].value = 99;
        assert_eq!(
            signature_hash(&tx, 0, &code(), SIGHASH_SINGLE).unwrap(),
            signature_hash(&changed, 0, &code(), SIGHASH_SINGLE).unwrap()
        );
        // Input 1 commits to output 1
        assert_ne!(
            signature_hash(&tx, 1, &code(), SIGHASH_SINGLE).unwrap(),
            signature_hash(&changed, 1, &code(), SIGHASH_SINGLE).unwrap()
        );
    }

    #[test]
    fn test_single_without_matching_output() {
        let tx = sample_tx();
        assert_eq!(signature_hash(&tx, 2, &code(), SIGHASH_SINGLE).unwrap(), SIGHASH_SINGLE_BUG);
    }

    #[test]
    fn test_anyonecanpay_ignores_other_inputs() {
        let tx = sample_tx();
        let mut changed = tx.clone();
        changed.inputs[2].prevout.index = 77;
        let hash_type = SIGHASH_ALL | SIGHASH_ANYONECANPAY;
        assert_eq!(
            signature_hash(&tx, 0, &code(), hash_type).unwrap(),
            signature_hash(&changed, 0, &code(), hash_type).unwrap()
        );
    }

    #[test]
    fn test_input_index_out_of_range() {
        assert_eq!(
            signature_hash(&sample_tx(), 3, &code(), SIGHASH_ALL),
            Err(InquisitorError::InputIndexOutOfRange { index: 3, inputs: 3 })
        );
    }
}
