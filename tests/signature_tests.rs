//! Signature verification against real and constructed spends

use block_inquisitor::block::decode_transaction;
use block_inquisitor::codec::{hash160, hash_to_hex};
use block_inquisitor::interpreter::ScriptError;
use block_inquisitor::sighash::{signature_hash, SIGHASH_ALL, SIGHASH_NONE, SIGHASH_SINGLE};
use block_inquisitor::validation::{validate_spends, ValidationFailure};
use block_inquisitor::verify::verify_txin;
use block_inquisitor::*;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

/// Block 170: the first transaction spending a coinbase to another key.
const TX_170_HEX: &str = concat!(
    "0100000001c997a5e56e104102fa209c6a852dd90660a20b2d9c352423edce25857fcd3704",
    "000000004847304402204e45e16932b8af514961a1d3a1a25fdf3f4f7732e9d624c6c61548",
    "ab5fb8cd410220181522ec8eca07de4860a4acdd12909d831cc56cbbac4622082221a8768d",
    "1d0901ffffffff0200ca9a3b00000000434104ae1a62fe09c5f51b13905f07f06b99a2f715",
    "9b2225f374cd378d71302fa28414e7aab37397f554a7df5f142c21c1b7303b8a0626f1bade",
    "d5c72a704f7e6cd84cac00286bee0000000043410411db93e1dcdb8a016b49840f8c53bc1e",
    "b68a382e97b1482ecad7b148a6909a5cb2e0eaddfb84ccf9744464f82e160bfa9b8b64f9d4",
    "c03f999b8643f656b412a3ac00000000",
);

const TX_170_HASH: &str = "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16";

/// Output 0 of the block 9 coinbase, which tx 170 spends.
const BLOCK_9_OUTPUT_SCRIPT: &str = concat!(
    "410411db93e1dcdb8a016b49840f8c53bc1eb68a382e97b1482ecad7b148a6909a5cb2e0ea",
    "ddfb84ccf9744464f82e160bfa9b8b64f9d4c03f999b8643f656b412a3ac",
);

const BLOCK_170_TIME: u32 = 1_231_731_025;

fn tx_170() -> Transaction {
    let bytes = hex::decode(TX_170_HEX).unwrap();
    let (tx, used) = decode_transaction(&bytes).unwrap();
    assert_eq!(used, bytes.len());
    tx
}

fn prev_script() -> Vec<u8> {
    hex::decode(BLOCK_9_OUTPUT_SCRIPT).unwrap()
}

/// Rewrite the hashtype byte trailing the signature pushed by input 0.
fn relabel_hashtype(tx: &mut Transaction, hash_type: u8) {
    let script = &mut tx.inputs[0].script;
    let last = script.len() - 1;
    script[last] = hash_type;
}

// ============================================================================
// HISTORICAL SPEND
// ============================================================================

#[test]
fn test_block_170_hash() {
    assert_eq!(hash_to_hex(&tx_170().hash()), TX_170_HASH);
}

#[test]
fn test_block_170_signature_valid() {
    let tx = tx_170();
    let report = verify_txin(&tx, 0, &prev_script(), VerifyOptions::mainnet(BLOCK_170_TIME)).unwrap();

    assert!(report.valid, "{:?}", report.failure);
    assert!(matches!(report.format, ScriptFormat::Coinbase { .. }));
    assert_eq!(report.checks.len(), 1);
    assert!(report.checks[0].valid);
    assert_eq!(report.pubkeys(), vec![&prev_script()[1..66]]);
}

#[test]
fn test_block_170_through_facade() {
    let inquisitor = BlockInquisitor::new();
    let report = inquisitor.verify_txin(&tx_170(), 0, &prev_script(), BLOCK_170_TIME).unwrap();
    assert!(report.valid);
}

#[test]
fn test_wrong_sighash_type_is_a_validation_failure() {
    for hash_type in [SIGHASH_NONE as u8, SIGHASH_SINGLE as u8, 0x81] {
        let mut tx = tx_170();
        relabel_hashtype(&mut tx, hash_type);

        let report = verify_txin(&tx, 0, &prev_script(), VerifyOptions::default()).unwrap();
        assert!(!report.valid, "hashtype {hash_type:#x} accepted");
        assert_eq!(report.failure, Some(ScriptError::EvalFalse));
        assert!(!report.checks[0].valid);
    }
}

#[test]
fn test_wrong_sighash_type_in_spend_validation() {
    let mut tx = tx_170();
    relabel_hashtype(&mut tx, SIGHASH_NONE as u8);
    let prev = TxOut {
        value: 50 * constants::SATOSHIS_PER_BTC,
        script: prev_script(),
    };
    let failures = validate_spends(&tx, 1, &[prev], VerifyOptions::default()).unwrap();
    assert_eq!(
        failures,
        vec![ValidationFailure::InvalidSpend {
            tx_index: 1,
            input_index: 0,
            failure: Some(ScriptError::EvalFalse),
        }]
    );
}

#[test]
fn test_spend_against_other_output_fails() {
    // Output 0 of tx 170 pays a different key
    let tx = tx_170();
    let report = verify_txin(&tx, 0, &tx.outputs[0].script, VerifyOptions::default()).unwrap();
    assert!(!report.valid);
}

// ============================================================================
// CONSTRUCTED SPENDS
// ============================================================================

fn funding_tx() -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![
            TxIn {
                prevout: OutPoint { hash: [0xaa; 32], index: 0 },
                script: vec![],
                sequence: 0xffffffff,
            },
            TxIn {
                prevout: OutPoint { hash: [0xbb; 32], index: 3 },
                script: vec![],
                sequence: 0xffffffff,
            },
        ],
        outputs: vec![
            TxOut { value: 700, script: vec![0x51] },
            TxOut { value: 200, script: vec![0x52] },
        ],
        lock_time: 0,
    }
}

fn p2pkh_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = vec![0x76, 0xa9, 0x14];
    script.extend_from_slice(&hash160(pubkey));
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

fn sign_input(tx: &Transaction, index: usize, prev: &[u8], secret: &SecretKey, hash_type: u32) -> Vec<u8> {
    let secp = Secp256k1::new();
    let digest = signature_hash(tx, index, &Script::decode(prev).unwrap(), hash_type).unwrap();
    let signature = secp.sign_ecdsa(&Message::from_digest_slice(&digest).unwrap(), secret);
    let mut bytes = signature.serialize_der().to_vec();
    bytes.push(hash_type as u8);
    bytes
}

fn script_sig(signature: &[u8], pubkey: &[u8]) -> Vec<u8> {
    Script::new(vec![ScriptElement::push(signature), ScriptElement::push(pubkey)]).encode()
}

#[test]
fn test_two_input_spend_each_input_signed() {
    let secp = Secp256k1::new();
    let secret_a = SecretKey::from_slice(&[0x31; 32]).unwrap();
    let secret_b = SecretKey::from_slice(&[0x32; 32]).unwrap();
    let pub_a = PublicKey::from_secret_key(&secp, &secret_a).serialize().to_vec();
    let pub_b = PublicKey::from_secret_key(&secp, &secret_b).serialize_uncompressed().to_vec();
    let prev_a = p2pkh_script(&pub_a);
    let prev_b = p2pkh_script(&pub_b);

    let mut tx = funding_tx();
    let sig_a = sign_input(&tx, 0, &prev_a, &secret_a, SIGHASH_ALL);
    let sig_b = sign_input(&tx, 1, &prev_b, &secret_b, SIGHASH_SINGLE);
    tx.inputs[0].script = script_sig(&sig_a, &pub_a);
    tx.inputs[1].script = script_sig(&sig_b, &pub_b);

    let prevs = [
        TxOut { value: 500, script: prev_a.clone() },
        TxOut { value: 400, script: prev_b.clone() },
    ];
    assert!(validate_spends(&tx, 0, &prevs, VerifyOptions::default()).unwrap().is_empty());

    // SINGLE on input 1 leaves output 0 free to change; ALL on input 0 does not
    let mut changed = tx.clone();
    changed.outputs[0].value = 699;
    assert!(verify_txin(&changed, 1, &prev_b, VerifyOptions::default()).unwrap().valid);
    assert!(!verify_txin(&changed, 0, &prev_a, VerifyOptions::default()).unwrap().valid);
}

#[test]
fn test_signature_swapped_between_inputs_fails() {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[0x41; 32]).unwrap();
    let pubkey = PublicKey::from_secret_key(&secp, &secret).serialize().to_vec();
    let prev = p2pkh_script(&pubkey);

    let mut tx = funding_tx();
    let sig = sign_input(&tx, 0, &prev, &secret, SIGHASH_ALL);
    tx.inputs[1].script = script_sig(&sig, &pubkey);

    let report = verify_txin(&tx, 1, &prev, VerifyOptions::default()).unwrap();
    assert!(!report.valid);
    assert_eq!(report.outcome(&sig, &pubkey), Some(false));
}

#[test]
fn test_encoding_flags_reported() {
    let tx = tx_170();
    let report = verify_txin(&tx, 0, &prev_script(), VerifyOptions::default()).unwrap();
    let flags = report.checks[0].encoding;
    assert!(flags.strict_der);
    assert!(flags.defined_hashtype);
    assert!(flags.canonical_pubkey);
}
