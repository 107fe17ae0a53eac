//! Script classification against the standard templates
//!
//! OP_NOPs are stripped before matching, so `OP_NOP <pubkey> OP_CHECKSIG` is still
//! recognized. Pay-to-script-hash and multisig classify as `NonStandard`; their
//! keys only surface when the spending script is interpreted.

use crate::address::{pubkey_addresses, Address, AddressVersions};
use crate::script::opcodes::*;
use crate::script::{Script, ScriptElement};
use serde::{Deserialize, Serialize};

/// Classification result with the keys or hashes each template embeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptFormat {
    /// `<pubkey> OP_CHECKSIG`, the pay-to-pubkey form used by early coinbase outputs
    Coinbase { pubkey: Vec<u8> },
    /// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
    PayToPubkeyHash { hash160: [u8; 20] },
    /// `<signature> <pubkey>`, the input script spending a `PayToPubkeyHash`
    SignaturePubkey { signature: Vec<u8>, pubkey: Vec<u8> },
    NonStandard,
}

impl ScriptFormat {
    pub fn is_standard(&self) -> bool {
        !matches!(self, ScriptFormat::NonStandard)
    }

    /// Public key embedded in the script, if any.
    pub fn pubkey(&self) -> Option<&[u8]> {
        match self {
            ScriptFormat::Coinbase { pubkey } | ScriptFormat::SignaturePubkey { pubkey, .. } => {
                Some(pubkey)
            }
            _ => None,
        }
    }

    /// Addresses recoverable from the script alone: two for a public key
    /// (compressed and uncompressed), one for a hash160, none otherwise.
    pub fn addresses(&self, versions: &AddressVersions) -> Vec<Address> {
        match self {
            ScriptFormat::Coinbase { pubkey } | ScriptFormat::SignaturePubkey { pubkey, .. } => {
                pubkey_addresses(versions.pubkey_hash(), pubkey)
            }
            ScriptFormat::PayToPubkeyHash { hash160 } => {
                vec![Address::new(versions.pubkey_hash(), *hash160)]
            }
            ScriptFormat::NonStandard => Vec::new(),
        }
    }
}

fn is_pubkey_len(data: &[u8]) -> bool {
    data.len() == 33 || data.len() == 65
}

/// Classify a decoded script.
pub fn classify(script: &Script) -> ScriptFormat {
    let elements: Vec<&ScriptElement> = script
        .elements()
        .iter()
        .filter(|element| !element.opcode().is_some_and(|op| op.is_nop()))
        .collect();

    match elements.as_slice() {
        [ScriptElement::Push { data: pubkey, .. }, ScriptElement::Op(OP_CHECKSIG)]
            if is_pubkey_len(pubkey) =>
        {
            ScriptFormat::Coinbase { pubkey: pubkey.clone() }
        }
        [ScriptElement::Op(OP_DUP), ScriptElement::Op(OP_HASH160), ScriptElement::Push { data: hash, .. }, ScriptElement::Op(OP_EQUALVERIFY), ScriptElement::Op(OP_CHECKSIG)] =>
        {
            match <[u8; 20]>::try_from(hash.as_slice()) {
                Ok(hash160) => ScriptFormat::PayToPubkeyHash { hash160 },
                Err(_) => ScriptFormat::NonStandard,
            }
        }
        [ScriptElement::Push { data: signature, .. }, ScriptElement::Push { data: pubkey, .. }]
            if !signature.is_empty() && is_pubkey_len(pubkey) =>
        {
            ScriptFormat::SignaturePubkey {
                signature: signature.clone(),
                pubkey: pubkey.clone(),
            }
        }
        _ => ScriptFormat::NonStandard,
    }
}

/// Classify raw script bytes; a script that cannot be decoded is `NonStandard`.
pub fn classify_bytes(bytes: &[u8]) -> ScriptFormat {
    Script::decode(bytes)
        .map(|script| classify(&script))
        .unwrap_or(ScriptFormat::NonStandard)
}

/// Redeem-script hash of an `OP_HASH160 <20 bytes> OP_EQUAL` output.
pub fn p2sh_hash(script: &Script) -> Option<[u8; 20]> {
    match script.elements() {
        [ScriptElement::Op(OP_HASH160), ScriptElement::Push { data, .. }, ScriptElement::Op(OP_EQUAL)] => {
            <[u8; 20]>::try_from(data.as_slice()).ok()
        }
        _ => None,
    }
}

/// Script-hash address of a pay-to-script-hash output.
pub fn p2sh_address(script: &Script, versions: &AddressVersions) -> Option<Address> {
    p2sh_hash(script).map(|hash| Address::new(versions.script_hash(), hash))
}
