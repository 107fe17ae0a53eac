//! # Block-Inquisitor
//!
//! Byte-level ingestion of raw Bitcoin block files.
//!
//! This crate turns magic-delimited, length-prefixed block data into structured
//! records and checks them: headers, transactions, scripts, the addresses funds
//! move between, Merkle roots, proof of work, and legacy ECDSA spends. It does
//! no I/O of its own and keeps no global state; the caller feeds it byte
//! windows and owns the chain-position table that assigns heights.
//!
//! ## Layout
//!
//! - [`codec`], [`address`]: varints, cursors, hashes, Base58Check
//! - [`script`], [`classify`]: script elements and standard formats
//! - [`types`], [`block`]: data model, block/transaction decoding, framing
//! - [`merkle`], [`pow`], [`economic`]: roots, targets, subsidy
//! - [`interpreter`], [`sighash`], [`verify`]: spend verification
//! - [`chain`], [`validation`], [`scan`]: heights, failure reports, batch scans
//!
//! ## Usage
//!
//! ```rust
//! use block_inquisitor::block::decode_header;
//! use block_inquisitor::codec::hash_to_hex;
//!
//! let genesis = hex::decode(concat!(
//!     "0100000000000000000000000000000000000000000000000000000000000000",
//!     "000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa",
//!     "4b1e5e4a29ab5f49ffff001d1dac2b7c",
//! ))
//! .unwrap();
//! let header = decode_header(&genesis).unwrap();
//! assert_eq!(
//!     hash_to_hex(&header.hash()),
//!     "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
//! );
//! ```

pub mod address;
pub mod block;
pub mod chain;
pub mod classify;
pub mod codec;
pub mod config;
pub mod constants;
pub mod economic;
pub mod error;
pub mod interpreter;
pub mod merkle;
pub mod pow;
pub mod scan;
pub mod script;
pub mod sighash;
pub mod types;
pub mod validation;
pub mod verify;

// Re-export commonly used types
pub use address::{Address, AddressKind, AddressVersions};
pub use block::{BlockFields, ParsedBlock, ParsedTransaction};
pub use chain::ChainPositionTable;
pub use classify::ScriptFormat;
pub use config::{InquisitorConfig, NetworkParams};
pub use error::{ErrorCategory, InquisitorError, Result};
pub use scan::{ChainScanner, ScanReport};
pub use script::{Opcode, Script, ScriptElement};
pub use types::*;
pub use validation::ValidationFailure;
pub use verify::{SpendVerification, VerifyOptions};

/// Decoding and validation bound to one configuration.
///
/// # Examples
///
/// ```
/// use block_inquisitor::{BlockInquisitor, InquisitorConfig, NetworkParams};
///
/// let config = InquisitorConfig {
///     network: NetworkParams::testnet3(),
///     ..Default::default()
/// };
/// let inquisitor = BlockInquisitor::with_config(config).unwrap();
/// let scanner = inquisitor.scanner().unwrap();
/// assert_eq!(scanner.chain().max_height(), -1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BlockInquisitor {
    config: InquisitorConfig,
}

impl BlockInquisitor {
    /// Mainnet defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: InquisitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(BlockInquisitor { config })
    }

    pub fn config(&self) -> &InquisitorConfig {
        &self.config
    }

    /// Decode every field of a block.
    pub fn decode_block(&self, bytes: &[u8]) -> Result<Block> {
        block::decode_block(bytes)
    }

    /// Decode only the requested fields of a block, deriving addresses with the
    /// configured version bytes.
    pub fn parse_block(&self, bytes: &[u8], fields: BlockFields) -> Result<ParsedBlock> {
        block::parse_block(bytes, fields, &self.config.address_versions)
    }

    /// Decode the requested fields of one transaction, returning it with the
    /// number of bytes it occupied.
    pub fn parse_transaction(&self, bytes: &[u8], fields: BlockFields) -> Result<(ParsedTransaction, usize)> {
        block::parse_transaction(bytes, fields, &self.config.address_versions)
    }

    /// Structural checks on a decoded block of `block_size` bytes at `height`.
    pub fn validate_block(&self, block: &Block, height: u64, block_size: usize) -> Vec<ValidationFailure> {
        validation::validate_block(block, height, block_size, self.config.max_block_size, &self.config.network)
    }

    /// Verify input `input_index` of `tx`, included in a block stamped
    /// `block_time`, against the script of the output it spends.
    pub fn verify_txin(
        &self,
        tx: &Transaction,
        input_index: usize,
        prev_output_script: &[u8],
        block_time: u32,
    ) -> Result<SpendVerification> {
        let options = VerifyOptions::for_block_time(block_time, self.config.p2sh_activation_time);
        verify::verify_txin(tx, input_index, prev_output_script, options)
    }

    /// Pay-to-pubkey-hash address of `pubkey` on the configured network.
    pub fn pubkey_address(&self, pubkey: &[u8]) -> Address {
        Address::from_pubkey(self.config.address_versions.pubkey_hash(), pubkey)
    }

    /// A fresh scanner starting from the genesis sentinel.
    pub fn scanner(&self) -> Result<ChainScanner> {
        ChainScanner::new(self.config.clone())
    }
}
