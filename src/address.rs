//! Base58Check codec and address derivation
//!
//! An address is a version byte plus a 20-byte hash160, checksummed and rendered
//! in base58. Version bytes come from an [`AddressVersions`] table so that
//! testnet and alternate-chain prefixes are configuration, not code.

use crate::codec::{double_sha256, hash160};
use crate::error::{InquisitorError, Result};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base58-encode raw bytes over the Bitcoin alphabet, one leading '1' per
/// leading zero byte.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decode a base58 string, restoring one zero byte per leading '1'.
pub fn base58_decode(input: &str) -> Result<Vec<u8>> {
    Ok(bs58::decode(input).into_vec()?)
}

/// Base58Check: base58(version ‖ payload ‖ SHA256d(version ‖ payload)[0..4])
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + 4);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = double_sha256(&data);
    data.extend_from_slice(&checksum[..4]);
    base58_encode(&data)
}

/// Inverse of [`base58check_encode`]; fails with `ChecksumMismatch` on a bad checksum.
pub fn base58check_decode(encoded: &str) -> Result<(u8, Vec<u8>)> {
    let data = base58_decode(encoded)?;
    if data.len() < 5 {
        return Err(InquisitorError::Base58TooShort(data.len()));
    }
    let (body, checksum) = data.split_at(data.len() - 4);
    if double_sha256(body)[..4] != *checksum {
        return Err(InquisitorError::ChecksumMismatch);
    }
    Ok((body[0], body[1..].to_vec()))
}

/// Named use of a version byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    PubKeyHash,
    ScriptHash,
    CompactPubKey,
    NamecoinPubKeyHash,
    PrivateKey,
    TestnetPubKeyHash,
    TestnetScriptHash,
}

/// One row of the version table: `(decimal, prefix-character)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressVersion {
    pub kind: AddressKind,
    pub version: u8,
    pub prefix: char,
}

/// Version-byte table consulted by the encoder and the type detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressVersions {
    pub entries: Vec<AddressVersion>,
}

impl Default for AddressVersions {
    fn default() -> Self {
        let row = |kind, version, prefix| AddressVersion { kind, version, prefix };
        AddressVersions {
            entries: vec![
                row(AddressKind::PubKeyHash, 0, '1'),
                row(AddressKind::ScriptHash, 5, '3'),
                row(AddressKind::CompactPubKey, 21, '4'),
                row(AddressKind::NamecoinPubKeyHash, 52, 'M'),
                row(AddressKind::PrivateKey, 128, '5'),
                row(AddressKind::TestnetPubKeyHash, 111, 'n'),
                row(AddressKind::TestnetScriptHash, 196, '2'),
            ],
        }
    }
}

impl AddressVersions {
    pub fn version_of(&self, kind: AddressKind) -> Option<u8> {
        self.entries.iter().find(|e| e.kind == kind).map(|e| e.version)
    }

    pub fn kind_of(&self, version: u8) -> Option<AddressKind> {
        self.entries.iter().find(|e| e.version == version).map(|e| e.kind)
    }

    /// Version byte for pay-to-pubkey-hash addresses, falling back to mainnet 0.
    pub fn pubkey_hash(&self) -> u8 {
        self.version_of(AddressKind::PubKeyHash).unwrap_or(0)
    }

    /// Version byte for pay-to-script-hash addresses, falling back to mainnet 5.
    pub fn script_hash(&self) -> u8 {
        self.version_of(AddressKind::ScriptHash).unwrap_or(5)
    }

    /// Decode and checksum-verify `address`, then look its version byte up.
    pub fn detect(&self, address: &str) -> Result<Option<AddressKind>> {
        let (version, _) = base58check_decode(address)?;
        Ok(self.kind_of(version))
    }
}

/// `{version_byte, payload_hash160}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub version: u8,
    pub hash160: [u8; 20],
}

impl Address {
    pub fn new(version: u8, hash160: [u8; 20]) -> Self {
        Address { version, hash160 }
    }

    /// Address of the hash160 of `pubkey`, using the encoding exactly as given.
    pub fn from_pubkey(version: u8, pubkey: &[u8]) -> Self {
        Address::new(version, hash160(pubkey))
    }

    pub fn encode(&self) -> String {
        base58check_encode(self.version, &self.hash160)
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let (version, payload) = base58check_decode(encoded)?;
        let hash160: [u8; 20] = payload
            .as_slice()
            .try_into()
            .map_err(|_| InquisitorError::InvalidAddressLength(payload.len()))?;
        Ok(Address { version, hash160 })
    }

    /// Named kind of this address's version byte in `versions`.
    pub fn kind(&self, versions: &AddressVersions) -> Option<AddressKind> {
        versions.kind_of(self.version)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Convert an address string back to its hash160.
pub fn address_to_hash160(address: &str) -> Result<[u8; 20]> {
    Address::decode(address).map(|a| a.hash160)
}

/// Every address a public key is known by.
///
/// The first entry hashes the key as encoded; the second hashes the other
/// (compressed vs uncompressed) serialization of the same point. A key that is
/// not a valid curve point yields only the first.
pub fn pubkey_addresses(version: u8, pubkey: &[u8]) -> Vec<Address> {
    let mut addresses = vec![Address::from_pubkey(version, pubkey)];
    if let Ok(point) = PublicKey::from_slice(pubkey) {
        let alternate: Vec<u8> = if pubkey.len() == 33 {
            point.serialize_uncompressed().to_vec()
        } else {
            point.serialize().to_vec()
        };
        addresses.push(Address::from_pubkey(version, &alternate));
    }
    addresses
}
