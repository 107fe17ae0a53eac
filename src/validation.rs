//! Block and transaction checks reported as values
//!
//! Nothing here aborts on an invalid block. Each check returns the
//! [`ValidationFailure`]s it found so a batch caller can log them and keep
//! going over historical or adversarial data.

use crate::codec::hash_to_hex;
use crate::config::NetworkParams;
use crate::constants::{LOCKTIME_THRESHOLD, SEQUENCE_FINAL};
use crate::economic::{coinbase_allowance, transaction_fee};
use crate::error::{InquisitorError, Result};
use crate::interpreter::ScriptError;
use crate::merkle::build_root;
use crate::pow::{bits_to_target, expected_bits, valid_pow};
use crate::types::{Block, BlockHeader, Hash, Transaction, TxOut};
use crate::verify::{verify_txin, VerifyOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A rule a block or transaction broke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationFailure {
    /// The header's root does not match the one recomputed from the transactions
    BadMerkleRoot { header: Hash, computed: Hash },
    /// Block hash is not below the target its bits encode
    BadProofOfWork { bits: u32 },
    /// Target is easier than the network's proof-of-work limit
    DifficultyBelowOne { bits: u32, limit_bits: u32 },
    BlockTooLarge { size: usize, limit: usize },
    /// Bits differ from what the retarget schedule requires
    UnexpectedBits { expected: u32, found: u32 },
    /// First transaction does not spend the null outpoint
    MissingCoinbase,
    /// A coinbase after the first transaction
    ExtraCoinbase { tx_index: usize },
    /// Lock time not yet reached and not disabled by final sequences
    NonFinalTransaction { tx_index: usize, lock_time: u32 },
    InvalidSpend {
        tx_index: usize,
        input_index: usize,
        failure: Option<ScriptError>,
    },
    /// Outputs spend more than the inputs provide
    TxBalance { tx_index: usize, inputs: u64, outputs: u64 },
    /// Coinbase pays out more than subsidy plus fees
    CoinbaseOverclaim { claimed: u64, allowed: u64 },
}

impl ValidationFailure {
    /// Short name used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationFailure::BadMerkleRoot { .. } => "bad_merkle_root",
            ValidationFailure::BadProofOfWork { .. } => "bad_proof_of_work",
            ValidationFailure::DifficultyBelowOne { .. } => "difficulty_below_one",
            ValidationFailure::BlockTooLarge { .. } => "block_too_large",
            ValidationFailure::UnexpectedBits { .. } => "unexpected_bits",
            ValidationFailure::MissingCoinbase => "missing_coinbase",
            ValidationFailure::ExtraCoinbase { .. } => "extra_coinbase",
            ValidationFailure::NonFinalTransaction { .. } => "non_final_transaction",
            ValidationFailure::InvalidSpend { .. } => "invalid_spend",
            ValidationFailure::TxBalance { .. } => "tx_balance",
            ValidationFailure::CoinbaseOverclaim { .. } => "coinbase_overclaim",
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::BadMerkleRoot { header, computed } => write!(
                f,
                "merkle root {} in header, {} computed",
                hash_to_hex(header),
                hash_to_hex(computed)
            ),
            ValidationFailure::BadProofOfWork { bits } => {
                write!(f, "block hash does not meet target of bits {bits:#010x}")
            }
            ValidationFailure::DifficultyBelowOne { bits, limit_bits } => {
                write!(f, "bits {bits:#010x} are easier than the limit {limit_bits:#010x}")
            }
            ValidationFailure::BlockTooLarge { size, limit } => {
                write!(f, "block of {size} bytes exceeds {limit} bytes")
            }
            ValidationFailure::UnexpectedBits { expected, found } => {
                write!(f, "bits {found:#010x}, expected {expected:#010x}")
            }
            ValidationFailure::MissingCoinbase => write!(f, "first transaction is not a coinbase"),
            ValidationFailure::ExtraCoinbase { tx_index } => {
                write!(f, "transaction {tx_index} is a second coinbase")
            }
            ValidationFailure::NonFinalTransaction { tx_index, lock_time } => {
                write!(f, "transaction {tx_index} is locked until {lock_time}")
            }
            ValidationFailure::InvalidSpend {
                tx_index,
                input_index,
                failure,
            } => {
                write!(f, "transaction {tx_index} input {input_index} fails verification")?;
                if let Some(failure) = failure {
                    write!(f, ": {failure}")?;
                }
                Ok(())
            }
            ValidationFailure::TxBalance {
                tx_index,
                inputs,
                outputs,
            } => write!(f, "transaction {tx_index} spends {outputs} from inputs worth {inputs}"),
            ValidationFailure::CoinbaseOverclaim { claimed, allowed } => {
                write!(f, "coinbase claims {claimed}, at most {allowed} allowed")
            }
        }
    }
}

/// CheckBlockHeader: ℋ × network → failures
///
/// 1. hash < ExpandTarget(bits)
/// 2. ExpandTarget(bits) ≤ ExpandTarget(pow_limit_bits)
///
/// Bits that overflow 256 bits only report the proof-of-work failure.
pub fn validate_header(header: &BlockHeader, network: &NetworkParams) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    if !valid_pow(&header.hash(), header.bits) {
        failures.push(ValidationFailure::BadProofOfWork { bits: header.bits });
    }
    if let (Ok(target), Ok(limit)) = (bits_to_target(header.bits), bits_to_target(network.pow_limit_bits)) {
        if target > limit {
            failures.push(ValidationFailure::DifficultyBelowOne {
                bits: header.bits,
                limit_bits: network.pow_limit_bits,
            });
        }
    }
    failures
}

/// Compare `bits` with the retarget schedule at `height`.
///
/// `period_first_time` and `period_last_time` are the timestamps of the first
/// and last blocks of the period that closes at `height`; they are only read on
/// a retarget boundary. Returns `None` when the bits match or when the
/// previous bits cannot be expanded.
pub fn valid_bits(
    height: u64,
    bits: u32,
    previous_bits: u32,
    period_first_time: u32,
    period_last_time: u32,
) -> Option<ValidationFailure> {
    let expected = expected_bits(height, previous_bits, period_first_time, period_last_time).ok()?;
    (expected != bits).then_some(ValidationFailure::UnexpectedBits { expected, found: bits })
}

/// IsFinalTx: 𝒯𝒳 × ℕ × ℕ → {true, false}
///
/// 1. lock_time = 0 is final
/// 2. lock_time < LOCKTIME_THRESHOLD is a height, otherwise a timestamp;
///    final once it is below the block's height or time respectively
/// 3. Otherwise final only if every input's sequence is SEQUENCE_FINAL
pub fn valid_locktime(tx: &Transaction, height: u64, block_time: u32) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let reached = if tx.lock_time < LOCKTIME_THRESHOLD {
        (tx.lock_time as u64) < height
    } else {
        tx.lock_time < block_time
    };
    reached || tx.inputs.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}

/// CheckBlock: ℬ × ℕ × ℕ × network → failures
///
/// 1. Header checks ([`validate_header`])
/// 2. block_size ≤ max_block_size
/// 3. The first transaction is a coinbase and no other is
/// 4. Every transaction is final at `height` and the header timestamp
/// 5. BuildMerkleRoot(tx hashes) = header.merkle_root
pub fn validate_block(
    block: &Block,
    height: u64,
    block_size: usize,
    max_block_size: usize,
    network: &NetworkParams,
) -> Vec<ValidationFailure> {
    let mut failures = validate_header(&block.header, network);

    if block_size > max_block_size {
        failures.push(ValidationFailure::BlockTooLarge {
            size: block_size,
            limit: max_block_size,
        });
    }

    if !block.transactions.first().is_some_and(Transaction::is_coinbase) {
        failures.push(ValidationFailure::MissingCoinbase);
    }
    for (tx_index, tx) in block.transactions.iter().enumerate().skip(1) {
        if tx.is_coinbase() {
            failures.push(ValidationFailure::ExtraCoinbase { tx_index });
        }
    }

    for (tx_index, tx) in block.transactions.iter().enumerate() {
        if !valid_locktime(tx, height, block.header.timestamp) {
            failures.push(ValidationFailure::NonFinalTransaction {
                tx_index,
                lock_time: tx.lock_time,
            });
        }
    }

    let computed = build_root(&block.tx_hashes());
    if computed != block.header.merkle_root {
        failures.push(ValidationFailure::BadMerkleRoot {
            header: block.header.merkle_root,
            computed,
        });
    }
    failures
}

/// Σ spent values ≥ Σ output values. A coinbase always balances.
pub fn valid_tx_balance(tx: &Transaction, prev_values: &[u64]) -> bool {
    transaction_fee(tx, prev_values).is_some_and(|fee| fee >= 0)
}

/// Verify every input of `tx` against the outputs it spends and check the
/// value balance.
///
/// `prev_outputs[i]` is the output spent by input `i`. A coinbase has nothing
/// to verify. Fails only when an input has no matching previous output.
pub fn validate_spends(
    tx: &Transaction,
    tx_index: usize,
    prev_outputs: &[TxOut],
    options: VerifyOptions,
) -> Result<Vec<ValidationFailure>> {
    let mut failures = Vec::new();
    if tx.is_coinbase() {
        return Ok(failures);
    }
    if prev_outputs.len() != tx.inputs.len() {
        return Err(InquisitorError::InputIndexOutOfRange {
            index: prev_outputs.len().min(tx.inputs.len()),
            inputs: prev_outputs.len(),
        });
    }

    for (input_index, prev) in prev_outputs.iter().enumerate() {
        let report = verify_txin(tx, input_index, &prev.script, options)?;
        if !report.valid {
            failures.push(ValidationFailure::InvalidSpend {
                tx_index,
                input_index,
                failure: report.failure,
            });
        }
    }

    let prev_values: Vec<u64> = prev_outputs.iter().map(|prev| prev.value).collect();
    if !valid_tx_balance(tx, &prev_values) {
        failures.push(ValidationFailure::TxBalance {
            tx_index,
            inputs: prev_values.iter().fold(0u64, |acc, &v| acc.saturating_add(v)),
            outputs: tx
                .outputs
                .iter()
                .fold(0u64, |acc, output| acc.saturating_add(output.value)),
        });
    }
    Ok(failures)
}

/// The coinbase of `block` may claim at most the subsidy at `height` plus `fees`.
pub fn validate_coinbase_claim(block: &Block, height: u64, fees: u64) -> Option<ValidationFailure> {
    let coinbase = block.transactions.first().filter(|tx| tx.is_coinbase())?;
    let claimed = coinbase
        .outputs
        .iter()
        .fold(0u64, |acc, output| acc.saturating_add(output.value));
    let allowed = coinbase_allowance(height, fees);
    (claimed > allowed).then_some(ValidationFailure::CoinbaseOverclaim { claimed, allowed })
}

/// Emit one warning per failure.
pub fn log_failures(block_hash: &Hash, height: Option<i64>, failures: &[ValidationFailure]) {
    for failure in failures {
        warn!(
            kind = failure.kind(),
            height,
            hash = %hash_to_hex(block_hash),
            "{failure}"
        );
    }
}
