//! Spend verification: one transaction input against the output it spends
//!
//! Verification outcomes are reported, never raised. Only a malformed request
//! (an input index the transaction does not have) is an error.

use crate::classify::{classify, ScriptFormat};
use crate::constants::P2SH_ACTIVATION_TIME;
use crate::error::{InquisitorError, Result};
use crate::interpreter::{verify_script, ScriptError, SignatureChecker};
use crate::script::Script;
use crate::sighash::{signature_hash, SighashType};
use crate::types::{ByteString, Transaction};
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, Verification, VerifyOnly};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Script rules applied during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// Evaluate pay-to-script-hash redeem scripts
    pub p2sh: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        VerifyOptions { p2sh: true }
    }
}

impl VerifyOptions {
    /// Rules in force for a block with the given timestamp.
    pub fn for_block_time(timestamp: u32, p2sh_activation_time: u32) -> Self {
        VerifyOptions {
            p2sh: timestamp >= p2sh_activation_time,
        }
    }

    /// Rules in force on mainnet at `timestamp`.
    pub fn mainnet(timestamp: u32) -> Self {
        Self::for_block_time(timestamp, P2SH_ACTIVATION_TIME)
    }
}

/// Encoding properties of a signature/pubkey pair. Historical blocks accepted
/// all of these violations, so they are observations, not rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingFlags {
    /// Signature is strict DER (BIP66)
    pub strict_der: bool,
    /// S value is in the lower half of the curve order
    pub low_s: bool,
    /// Hashtype byte is ALL, NONE or SINGLE, optionally with ANYONECANPAY
    pub defined_hashtype: bool,
    /// Pubkey is 33 bytes with prefix 02/03 or 65 bytes with prefix 04
    pub canonical_pubkey: bool,
}

impl EncodingFlags {
    pub fn inspect(signature: &[u8], pubkey: &[u8]) -> Self {
        let low_s = signature
            .split_last()
            .and_then(|(_, der)| Signature::from_der_lax(der).ok())
            .map(|sig| {
                let mut normalized = sig;
                normalized.normalize_s();
                normalized == sig
            })
            .unwrap_or(false);
        EncodingFlags {
            strict_der: is_strict_der(signature),
            low_s,
            defined_hashtype: signature
                .last()
                .is_some_and(|&hash_type| SighashType::is_defined(hash_type as u32)),
            canonical_pubkey: is_canonical_pubkey(pubkey),
        }
    }

    pub fn is_standard(&self) -> bool {
        self.strict_der && self.low_s && self.defined_hashtype && self.canonical_pubkey
    }
}

/// Strict DER with a trailing hashtype byte:
/// `0x30 <len> 0x02 <len R> <R> 0x02 <len S> <S> <hashtype>`, with R and S
/// positive and minimally encoded.
pub fn is_strict_der(sig: &[u8]) -> bool {
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 3 {
        return false;
    }
    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 7 != sig.len() {
        return false;
    }

    if sig[2] != 0x02 || len_r == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0 && sig[5] & 0x80 == 0 {
        return false;
    }

    if sig[len_r + 4] != 0x02 || len_s == 0 || sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

pub fn is_canonical_pubkey(pubkey: &[u8]) -> bool {
    match pubkey.first() {
        Some(0x02) | Some(0x03) => pubkey.len() == 33,
        Some(0x04) => pubkey.len() == 65,
        _ => false,
    }
}

/// One signature/pubkey pair the scripts presented, with its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCheck {
    /// DER signature followed by its hashtype byte
    pub signature: ByteString,
    pub pubkey: ByteString,
    pub valid: bool,
    pub encoding: EncodingFlags,
}

/// Outcome of verifying one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendVerification {
    /// Format of the spent output's script
    pub format: ScriptFormat,
    /// Every signature check performed, in execution order
    pub checks: Vec<SignatureCheck>,
    pub valid: bool,
    pub failure: Option<ScriptError>,
}

impl SpendVerification {
    /// Distinct public keys the spend presented, in first-seen order.
    pub fn pubkeys(&self) -> Vec<&[u8]> {
        let mut keys: Vec<&[u8]> = Vec::new();
        for check in &self.checks {
            if !keys.contains(&check.pubkey.as_slice()) {
                keys.push(&check.pubkey);
            }
        }
        keys
    }

    /// Validity of `signature` against `pubkey`, if that pair was checked.
    pub fn outcome(&self, signature: &[u8], pubkey: &[u8]) -> Option<bool> {
        self.checks
            .iter()
            .find(|check| check.signature == signature && check.pubkey == pubkey)
            .map(|check| check.valid)
    }
}

/// Verify an ECDSA signature (with trailing hashtype byte) over the signature
/// hash of `tx`'s input `input_index`.
///
/// Signatures are parsed laxly and normalized to low S, matching what the chain
/// accepted before BIP66.
pub fn verify_signature<C: Verification>(
    secp: &Secp256k1<C>,
    signature: &[u8],
    pubkey: &[u8],
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
) -> bool {
    let Some((&hash_type, der)) = signature.split_last() else {
        return false;
    };
    let pubkey = match PublicKey::from_slice(pubkey) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let mut signature = match Signature::from_der_lax(der) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    signature.normalize_s();

    let digest = match signature_hash(tx, input_index, script_code, hash_type as u32) {
        Ok(digest) => digest,
        Err(_) => return false,
    };
    let message = match Message::from_digest_slice(&digest) {
        Ok(msg) => msg,
        Err(_) => return false,
    };
    secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
}

/// [`SignatureChecker`] bound to one transaction input, recording every check.
pub struct TransactionSignatureChecker<'a> {
    secp: Secp256k1<VerifyOnly>,
    tx: &'a Transaction,
    input_index: usize,
    checks: Vec<SignatureCheck>,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize) -> Self {
        TransactionSignatureChecker {
            secp: Secp256k1::verification_only(),
            tx,
            input_index,
            checks: Vec::new(),
        }
    }

    pub fn into_checks(self) -> Vec<SignatureCheck> {
        self.checks
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_signature(&mut self, signature: &[u8], pubkey: &[u8], script_code: &Script) -> bool {
        let valid = verify_signature(&self.secp, signature, pubkey, self.tx, self.input_index, script_code);
        trace!(
            input = self.input_index,
            pubkey = %hex::encode(pubkey),
            valid,
            "checked signature"
        );
        self.checks.push(SignatureCheck {
            signature: signature.to_vec(),
            pubkey: pubkey.to_vec(),
            valid,
            encoding: EncodingFlags::inspect(signature, pubkey),
        });
        valid
    }
}

/// VerifyTxIn: 𝒯𝒳 × ℕ × 𝒮𝒞 → report
///
/// 1. Classify the spent output's script
/// 2. Execute the input script followed by the output script (and a P2SH
///    redeem script when enabled), checking each signature against the
///    signature hash of this input
/// 3. Report every (signature, pubkey, valid) check and the overall outcome
///
/// A script that cannot be decoded fails verification rather than erroring.
pub fn verify_txin(
    tx: &Transaction,
    input_index: usize,
    prev_output_script: &[u8],
    options: VerifyOptions,
) -> Result<SpendVerification> {
    let input = tx.inputs.get(input_index).ok_or(InquisitorError::InputIndexOutOfRange {
        index: input_index,
        inputs: tx.inputs.len(),
    })?;

    let decoded = Script::decode(&input.script)
        .and_then(|script_sig| Ok((script_sig, Script::decode(prev_output_script)?)));
    let (script_sig, script_pubkey) = match decoded {
        Ok(scripts) => scripts,
        Err(e) => {
            let format = crate::classify::classify_bytes(prev_output_script);
            return Ok(SpendVerification {
                format,
                checks: Vec::new(),
                valid: false,
                failure: Some(ScriptError::Decode(e.to_string())),
            });
        }
    };

    let format = classify(&script_pubkey);
    let mut checker = TransactionSignatureChecker::new(tx, input_index);
    let outcome = verify_script(&script_sig, &script_pubkey, options.p2sh, &mut checker);
    let checks = checker.into_checks();
    trace!(
        input = input_index,
        checks = checks.len(),
        valid = outcome.is_ok(),
        "verified input"
    );

    Ok(SpendVerification {
        format,
        checks,
        valid: outcome.is_ok(),
        failure: outcome.err(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::hash160;
    use crate::script::ScriptElement;
    use crate::sighash::{SIGHASH_ALL, SIGHASH_NONE};
    use crate::types::{OutPoint, TxIn, TxOut};
    use secp256k1::SecretKey;

    fn unsigned_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                prevout: OutPoint { hash: [7; 32], index: 0 },
                script: Vec::new(),
                sequence: 0xffff_ffff,
            }],
            outputs: vec![TxOut {
                value: 4_000,
                script: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    fn key(byte: u8) -> (SecretKey, Vec<u8>) {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
        let public = PublicKey::from_secret_key(&secp, &secret).serialize().to_vec();
        (secret, public)
    }

    fn sign(tx: &Transaction, prev_script: &[u8], secret: &SecretKey, hash_type: u32, label: u8) -> Vec<u8> {
        let secp = Secp256k1::new();
        let code = Script::decode(prev_script).unwrap();
        let digest = signature_hash(tx, 0, &code, hash_type).unwrap();
        let sig = secp.sign_ecdsa(&Message::from_digest_slice(&digest).unwrap(), secret);
        let mut bytes = sig.serialize_der().to_vec();
        bytes.push(label);
        bytes
    }

    fn push_script(items: &[&[u8]]) -> Vec<u8> {
        Script::new(items.iter().map(|item| ScriptElement::push(item)).collect()).encode()
    }

    fn p2pkh(pubkey: &[u8]) -> Vec<u8> {
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&hash160(pubkey));
        script.extend_from_slice(&[0x88, 0xac]);
        script
    }

    #[test]
    fn test_pay_to_pubkey_hash_spend() {
        let (secret, public) = key(0x11);
        let prev = p2pkh(&public);
        let mut tx = unsigned_tx();
        let sig = sign(&tx, &prev, &secret, SIGHASH_ALL, 0x01);
        tx.inputs[0].script = push_script(&[&sig, &public]);

        let report = verify_txin(&tx, 0, &prev, VerifyOptions::default()).unwrap();
        assert!(report.valid, "{:?}", report.failure);
        assert!(matches!(report.format, ScriptFormat::PayToPubkeyHash { .. }));
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.outcome(&sig, &public), Some(true));
        assert!(report.checks[0].encoding.is_standard());
    }

    #[test]
    fn test_tampered_output_invalidates() {
        let (secret, public) = key(0x11);
        let prev = p2pkh(&public);
        let mut tx = unsigned_tx();
        let sig = sign(&tx, &prev, &secret, SIGHASH_ALL, 0x01);
        tx.inputs[0].script = push_script(&[&sig, &public]);
        tx.outputs[0].value += 1;

        let report = verify_txin(&tx, 0, &prev, VerifyOptions::default()).unwrap();
        assert!(!report.valid);
        assert_eq!(report.failure, Some(ScriptError::EvalFalse));
        assert_eq!(report.outcome(&sig, &public), Some(false));
    }

    #[test]
    fn test_mislabelled_hashtype_invalidates() {
        // Signed over the ALL preimage but labelled NONE
        let (secret, public) = key(0x22);
        let prev = p2pkh(&public);
        let mut tx = unsigned_tx();
        let sig = sign(&tx, &prev, &secret, SIGHASH_ALL, SIGHASH_NONE as u8);
        tx.inputs[0].script = push_script(&[&sig, &public]);

        let report = verify_txin(&tx, 0, &prev, VerifyOptions::default()).unwrap();
        assert!(!report.valid);
        assert_eq!(report.checks.len(), 1);
        assert!(!report.checks[0].valid);
    }

    #[test]
    fn test_wrong_pubkey_hash_fails_before_signature() {
        let (secret, public) = key(0x11);
        let (_, other) = key(0x33);
        let prev = p2pkh(&other);
        let mut tx = unsigned_tx();
        let sig = sign(&tx, &prev, &secret, SIGHASH_ALL, 0x01);
        tx.inputs[0].script = push_script(&[&sig, &public]);

        let report = verify_txin(&tx, 0, &prev, VerifyOptions::default()).unwrap();
        assert!(!report.valid);
        assert!(report.checks.is_empty());
        assert!(matches!(report.failure, Some(ScriptError::VerifyFailed(_))));
    }

    #[test]
    fn test_bare_multisig_recovers_keys() {
        let (_, public1) = key(0x44);
        let (secret2, public2) = key(0x55);
        // 1 <pk1> <pk2> 2 CHECKMULTISIG
        let mut prev = vec![0x51, 0x21];
        prev.extend_from_slice(&public1);
        prev.push(0x21);
        prev.extend_from_slice(&public2);
        prev.extend_from_slice(&[0x52, 0xae]);

        let mut tx = unsigned_tx();
        let sig = sign(&tx, &prev, &secret2, SIGHASH_ALL, 0x01);
        tx.inputs[0].script = push_script(&[&[], &sig]);

        let report = verify_txin(&tx, 0, &prev, VerifyOptions::default()).unwrap();
        assert_eq!(report.format, ScriptFormat::NonStandard);
        assert!(report.valid, "{:?}", report.failure);
        // Keys are tried from the last pushed
        assert_eq!(report.outcome(&sig, &public2), Some(true));
        assert_eq!(report.pubkeys(), vec![public2.as_slice()]);
    }

    #[test]
    fn test_undecodable_script_is_reported() {
        let mut tx = unsigned_tx();
        tx.inputs[0].script = vec![0x4c];
        let report = verify_txin(&tx, 0, &[0x51], VerifyOptions::default()).unwrap();
        assert!(!report.valid);
        assert!(matches!(report.failure, Some(ScriptError::Decode(_))));
    }

    #[test]
    fn test_input_index_out_of_range() {
        assert_eq!(
            verify_txin(&unsigned_tx(), 1, &[0x51], VerifyOptions::default()),
            Err(InquisitorError::InputIndexOutOfRange { index: 1, inputs: 1 })
        );
    }

    #[test]
    fn test_strict_der() {
        let (secret, public) = key(0x11);
        let sig = sign(&unsigned_tx(), &[0x51], &secret, SIGHASH_ALL, 0x01);
        assert!(is_strict_der(&sig));
        // Padded R
        let mut padded = sig.clone();
        padded[1] += 1;
        padded[3] += 1;
        padded.insert(4, 0x00);
        assert!(!is_strict_der(&padded));
        assert!(!is_strict_der(&sig[..8]));
        assert!(is_canonical_pubkey(&public));
        assert!(!is_canonical_pubkey(&public[..32]));
    }

    #[test]
    fn test_options_follow_activation_time() {
        assert!(!VerifyOptions::mainnet(P2SH_ACTIVATION_TIME - 1).p2sh);
        assert!(VerifyOptions::mainnet(P2SH_ACTIVATION_TIME).p2sh);
    }
}
