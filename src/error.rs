//! Error types for block ingestion
//!
//! Every error here is fatal to the decode or registration call that raised it.
//! Validation outcomes (bad Merkle root, bad proof of work, failed signature) are
//! not errors; see [`crate::validation::ValidationFailure`].

use thiserror::Error;

/// Broad class of an [`InquisitorError`], used by batch callers to decide whether
/// to abort, retry after fetching more history, or adjust configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad magic, truncated varint or push-data, wrong block/tx length.
    MalformedInput,
    /// Unknown parent hash.
    ChainContinuity,
    /// Block larger than the configured processing window.
    ResourceLimitExceeded,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InquisitorError {
    #[error("Truncated input: needed {needed} bytes but only {available} remain")]
    TruncatedInput { needed: usize, available: usize },

    #[error("Script truncated: push declares {declared} bytes but only {remaining} remain")]
    ScriptTruncated { declared: usize, remaining: usize },

    #[error("Magic mismatch at byte offset {offset}: expected {expected}, found {found}")]
    MagicMismatch {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("Incomplete block: declared {declared} bytes but only {available} available")]
    IncompleteBlock { declared: usize, available: usize },

    #[error("Block of {declared} bytes exceeds the processing window of {limit} bytes; raise `{knob}` to process it")]
    BlockTooLarge {
        declared: usize,
        limit: usize,
        knob: &'static str,
    },

    #[error("Transaction has no inputs")]
    NoInputs,

    #[error("Transaction has no outputs")]
    NoOutputs,

    #[error("Trailing bytes: parsed {parsed} of {length} bytes")]
    TrailingBytes { parsed: usize, length: usize },

    #[error("Varint does not fit in the target integer")]
    VarIntTooLarge,

    #[error("Base58Check checksum mismatch")]
    ChecksumMismatch,

    #[error("Invalid base58 character: {0:?}")]
    InvalidBase58Character(char),

    #[error("Invalid base58: {0}")]
    InvalidBase58(String),

    #[error("Base58Check payload too short: {0} bytes")]
    Base58TooShort(usize),

    #[error("Address payload is {0} bytes, expected a 20-byte hash160")]
    InvalidAddressLength(usize),

    #[error("Unknown opcode name: {0}")]
    InvalidOpcodeName(String),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Malformed human-readable script: {0}")]
    InvalidHumanScript(String),

    #[error("Input index {index} out of range for transaction with {inputs} inputs")]
    InputIndexOutOfRange { index: usize, inputs: usize },

    #[error("Compact bits {bits:#010x} expand beyond 256 bits")]
    TargetOverflow { bits: u32 },

    #[error("Orphan parent missing: block {block_hash} references unknown parent {previous_block_hash}")]
    OrphanParentMissing {
        block_hash: String,
        previous_block_hash: String,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl InquisitorError {
    /// The taxonomy class of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            InquisitorError::OrphanParentMissing { .. } => ErrorCategory::ChainContinuity,
            InquisitorError::BlockTooLarge { .. } => ErrorCategory::ResourceLimitExceeded,
            _ => ErrorCategory::MalformedInput,
        }
    }
}

impl From<hex::FromHexError> for InquisitorError {
    fn from(err: hex::FromHexError) -> Self {
        InquisitorError::InvalidHex(err.to_string())
    }
}

impl From<bs58::decode::Error> for InquisitorError {
    fn from(err: bs58::decode::Error) -> Self {
        match err {
            bs58::decode::Error::InvalidCharacter { character, .. } => {
                InquisitorError::InvalidBase58Character(character)
            }
            other => InquisitorError::InvalidBase58(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, InquisitorError>;
