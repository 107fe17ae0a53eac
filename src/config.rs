//! Scan configuration, loaded from a JSON file
//!
//! Every field has a default, so a config file only names what it changes:
//!
//! ```json
//! { "network": "testnet3", "max_block_size": 2097152 }
//! ```

use crate::address::AddressVersions;
use crate::chain::ChainTableConfig;
use crate::constants::{COINBASE_MATURITY, DEFAULT_MAX_BLOCK_SIZE, INITIAL_BITS, P2SH_ACTIVATION_TIME};
use crate::error::{InquisitorError, Result};
use anyhow::Context;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

/// Network identity: the magic bytes prefixing every block on disk, plus the
/// header rules that differ between networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub name: String,
    #[serde(serialize_with = "serialize_magic", deserialize_with = "deserialize_magic")]
    pub magic: [u8; 4],
    /// Compact form of the easiest target a header may carry
    #[serde(default = "default_pow_limit_bits")]
    pub pow_limit_bits: u32,
    /// Check every header's bits against the 2016-block retarget schedule
    #[serde(default = "default_enforce_retarget")]
    pub enforce_retarget: bool,
}

fn default_pow_limit_bits() -> u32 {
    INITIAL_BITS
}

fn default_enforce_retarget() -> bool {
    true
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        NetworkParams {
            name: "mainnet".to_string(),
            magic: [0xf9, 0xbe, 0xb4, 0xd9],
            pow_limit_bits: INITIAL_BITS,
            enforce_retarget: true,
        }
    }

    pub fn testnet3() -> Self {
        NetworkParams {
            name: "testnet3".to_string(),
            magic: [0x0b, 0x11, 0x09, 0x07],
            pow_limit_bits: INITIAL_BITS,
            // Minimum-difficulty blocks break the schedule
            enforce_retarget: false,
        }
    }

    pub fn regtest() -> Self {
        NetworkParams {
            name: "regtest".to_string(),
            magic: [0xfa, 0xbf, 0xb5, 0xda],
            pow_limit_bits: 0x207fffff,
            enforce_retarget: false,
        }
    }

    /// Look a preset up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mainnet" | "main" => Some(Self::mainnet()),
            "testnet3" | "testnet" | "test" => Some(Self::testnet3()),
            "regtest" => Some(Self::regtest()),
            _ => None,
        }
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

fn serialize_magic<S: Serializer>(magic: &[u8; 4], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(magic))
}

/// Magic bytes as an 8-character hex string.
fn deserialize_magic<'de, D>(deserializer: D) -> std::result::Result<[u8; 4], D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let bytes = hex::decode(&s).map_err(de::Error::custom)?;
    bytes
        .try_into()
        .map_err(|_| de::Error::custom(format!("Invalid magic '{s}', expected 4 bytes of hex")))
}

/// A network given either as a preset name or as a full `{name, magic}` table.
fn deserialize_network<'de, D>(deserializer: D) -> std::result::Result<NetworkParams, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NetworkSetting {
        Preset(String),
        Custom(NetworkParams),
    }

    match NetworkSetting::deserialize(deserializer)? {
        NetworkSetting::Custom(params) => Ok(params),
        NetworkSetting::Preset(name) => NetworkParams::from_name(&name).ok_or_else(|| {
            de::Error::custom(format!(
                "Invalid network '{name}', valid options are 'mainnet', 'testnet3' or 'regtest'"
            ))
        }),
    }
}

/// Configuration for decoding, validating and tracking a block stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InquisitorConfig {
    #[serde(deserialize_with = "deserialize_network")]
    pub network: NetworkParams,
    /// Largest block accepted into the in-memory processing window
    pub max_block_size: usize,
    /// Chain-position table bounds
    pub chain: ChainTableConfig,
    /// Confirmations below the tip before an off-chain block is called an orphan
    pub orphan_confirmations: u64,
    pub address_versions: AddressVersions,
    /// Block timestamp from which pay-to-script-hash redeem scripts are evaluated
    pub p2sh_activation_time: u32,
}

impl Default for InquisitorConfig {
    fn default() -> Self {
        InquisitorConfig {
            network: NetworkParams::default(),
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            chain: ChainTableConfig::default(),
            orphan_confirmations: COINBASE_MATURITY,
            address_versions: AddressVersions::default(),
            p2sh_activation_time: P2SH_ACTIVATION_TIME,
        }
    }
}

impl InquisitorConfig {
    /// Performs checks on config data.
    pub fn validate(&self) -> Result<()> {
        if self.max_block_size == 0 {
            return Err(InquisitorError::Configuration(
                "max_block_size must be greater than zero".to_string(),
            ));
        }
        if self.chain.keep_last_n == 0 {
            return Err(InquisitorError::Configuration(
                "chain.keep_last_n must be greater than zero".to_string(),
            ));
        }
        if self.chain.prune_threshold as u64 <= self.chain.keep_last_n {
            return Err(InquisitorError::Configuration(format!(
                "chain.prune_threshold ({}) must exceed chain.keep_last_n ({})",
                self.chain.prune_threshold, self.chain.keep_last_n
            )));
        }
        if self.address_versions.entries.is_empty() {
            return Err(InquisitorError::Configuration(
                "address_versions must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: InquisitorConfig = serde_json::from_str(json).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }
}

/// Read and validate a JSON config file.
pub fn load(path: impl AsRef<Path>) -> anyhow::Result<InquisitorConfig> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    InquisitorConfig::from_json(&json).with_context(|| format!("Invalid config file {}", path.display()))
}
