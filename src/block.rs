//! Block and transaction decoding
//!
//! Two decoders share one wire layout:
//! - [`decode_block`] / [`decode_transaction`] build the full [`Block`] /
//!   [`Transaction`] types.
//! - [`parse_block`] / [`parse_transaction`] populate only the fields named in a
//!   [`BlockFields`] request and return as soon as the request is satisfied.
//!
//! [`BlockFrames`] splits an on-disk byte window (`magic ‖ length ‖ block`,
//! repeated) into block slices.

use crate::address::{Address, AddressVersions};
use crate::classify::{classify, ScriptFormat};
use crate::codec::{double_sha256, reversed, Reader};
use crate::constants::{FRAME_PREFIX_SIZE, HEADER_SIZE};
use crate::error::{InquisitorError, Result};
use crate::pow::{bits_to_difficulty, bits_to_target};
use crate::script::Script;
use crate::types::*;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};
use tracing::trace;

/// A typed set of requested fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockFields(u64);

impl BlockFields {
    pub const NONE: BlockFields = BlockFields(0);

    // Header
    pub const BLOCK_HASH: BlockFields = BlockFields(1 << 0);
    pub const FORMAT_VERSION: BlockFields = BlockFields(1 << 1);
    pub const PREVIOUS_BLOCK_HASH: BlockFields = BlockFields(1 << 2);
    pub const MERKLE_ROOT: BlockFields = BlockFields(1 << 3);
    pub const TIMESTAMP: BlockFields = BlockFields(1 << 4);
    pub const BITS: BlockFields = BlockFields(1 << 5);
    pub const TARGET: BlockFields = BlockFields(1 << 6);
    pub const DIFFICULTY: BlockFields = BlockFields(1 << 7);
    pub const NONCE: BlockFields = BlockFields(1 << 8);
    pub const BLOCK_SIZE: BlockFields = BlockFields(1 << 9);
    pub const NUM_TXS: BlockFields = BlockFields(1 << 10);

    // Transaction
    pub const TX_VERSION: BlockFields = BlockFields(1 << 11);
    pub const NUM_TX_INPUTS: BlockFields = BlockFields(1 << 12);
    pub const NUM_TX_OUTPUTS: BlockFields = BlockFields(1 << 13);
    pub const TX_LOCK_TIME: BlockFields = BlockFields(1 << 14);
    pub const TX_HASH: BlockFields = BlockFields(1 << 15);
    pub const TX_BYTES: BlockFields = BlockFields(1 << 16);
    pub const TX_SIZE: BlockFields = BlockFields(1 << 17);

    // Inputs
    pub const TXIN_HASH: BlockFields = BlockFields(1 << 18);
    pub const TXIN_INDEX: BlockFields = BlockFields(1 << 19);
    pub const TXIN_SCRIPT_LENGTH: BlockFields = BlockFields(1 << 20);
    pub const TXIN_SCRIPT: BlockFields = BlockFields(1 << 21);
    pub const TXIN_PARSED_SCRIPT: BlockFields = BlockFields(1 << 22);
    pub const TXIN_SCRIPT_FORMAT: BlockFields = BlockFields(1 << 23);
    pub const TXIN_ADDRESSES: BlockFields = BlockFields(1 << 24);
    pub const TXIN_SEQUENCE_NUM: BlockFields = BlockFields(1 << 25);

    // Outputs
    pub const TXOUT_FUNDS: BlockFields = BlockFields(1 << 26);
    pub const TXOUT_SCRIPT_LENGTH: BlockFields = BlockFields(1 << 27);
    pub const TXOUT_SCRIPT: BlockFields = BlockFields(1 << 28);
    pub const TXOUT_PARSED_SCRIPT: BlockFields = BlockFields(1 << 29);
    pub const TXOUT_SCRIPT_FORMAT: BlockFields = BlockFields(1 << 30);
    pub const TXOUT_ADDRESSES: BlockFields = BlockFields(1 << 31);

    /// Every field decoded from the 80-byte header, plus the block size.
    pub const HEADER: BlockFields = BlockFields((1 << 10) - 1);
    pub const TXIN: BlockFields = BlockFields(0xff << 18);
    pub const TXOUT: BlockFields = BlockFields(0x3f << 26);
    /// Every per-transaction field.
    pub const TRANSACTION: BlockFields = BlockFields(((1 << 32) - 1) & !((1 << 11) - 1));
    pub const ALL: BlockFields = BlockFields((1 << 32) - 1);

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u64) -> Self {
        BlockFields(bits & BlockFields::ALL.0)
    }

    pub const fn contains(self, other: BlockFields) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: BlockFields) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: BlockFields) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: BlockFields) {
        self.0 &= !other.0;
    }
}

impl BitOr for BlockFields {
    type Output = BlockFields;

    fn bitor(self, rhs: BlockFields) -> BlockFields {
        BlockFields(self.0 | rhs.0)
    }
}

impl BitOrAssign for BlockFields {
    fn bitor_assign(&mut self, rhs: BlockFields) {
        self.0 |= rhs.0;
    }
}

/// A decoded script, or the reason it could not be decoded.
pub type DecodedScript = std::result::Result<Script, String>;

/// Input fields populated per the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTxIn {
    pub prev_tx_hash: Option<Hash>,
    pub prev_output_index: Option<u32>,
    pub script_length: Option<usize>,
    pub script: Option<ByteString>,
    pub parsed_script: Option<DecodedScript>,
    pub script_format: Option<ScriptFormat>,
    pub addresses: Option<Vec<Address>>,
    pub sequence: Option<u32>,
}

/// Output fields populated per the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTxOut {
    pub value: Option<u64>,
    pub script_length: Option<usize>,
    pub script: Option<ByteString>,
    pub parsed_script: Option<DecodedScript>,
    pub script_format: Option<ScriptFormat>,
    pub addresses: Option<Vec<Address>>,
}

/// Transaction fields populated per the request. `inputs` / `outputs` stay empty
/// unless an input / output field was requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub version: Option<i32>,
    pub num_inputs: Option<u64>,
    pub inputs: Vec<ParsedTxIn>,
    pub num_outputs: Option<u64>,
    pub outputs: Vec<ParsedTxOut>,
    pub lock_time: Option<u32>,
    pub hash: Option<Hash>,
    pub bytes: Option<ByteString>,
    pub size: Option<usize>,
}

/// Block fields populated per the request. `transactions` stays empty unless a
/// per-transaction field was requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedBlock {
    pub block_hash: Option<Hash>,
    pub format_version: Option<i32>,
    pub previous_block_hash: Option<Hash>,
    pub merkle_root: Option<Hash>,
    pub timestamp: Option<u32>,
    pub bits: Option<u32>,
    pub target: Option<U256>,
    pub difficulty: Option<f64>,
    pub nonce: Option<u32>,
    pub block_size: Option<usize>,
    pub num_txs: Option<u64>,
    pub transactions: Vec<ParsedTransaction>,
}

/// Decode the fixed 80-byte header.
pub fn decode_header(bytes: &[u8]) -> Result<BlockHeader> {
    let mut reader = Reader::new(bytes);
    read_header(&mut reader)
}

fn read_header(reader: &mut Reader<'_>) -> Result<BlockHeader> {
    Ok(BlockHeader {
        version: reader.read_i32_le()?,
        previous_block_hash: reader.read_hash()?,
        merkle_root: reader.read_hash()?,
        timestamp: reader.read_u32_le()?,
        bits: reader.read_u32_le()?,
        nonce: reader.read_u32_le()?,
    })
}

/// Decode one transaction from the front of `bytes`, returning it with the
/// number of bytes it occupied.
pub fn decode_transaction(bytes: &[u8]) -> Result<(Transaction, usize)> {
    let mut reader = Reader::new(bytes);
    let tx = read_transaction(&mut reader)?;
    Ok((tx, reader.position()))
}

fn read_transaction(reader: &mut Reader<'_>) -> Result<Transaction> {
    let version = reader.read_i32_le()?;

    let num_inputs = reader.read_varint_len()?;
    if num_inputs == 0 {
        return Err(InquisitorError::NoInputs);
    }
    let mut inputs = Vec::with_capacity(num_inputs.min(reader.remaining() / 41));
    for _ in 0..num_inputs {
        inputs.push(TxIn {
            prevout: OutPoint {
                hash: reader.read_hash()?,
                index: reader.read_u32_le()?,
            },
            script: reader.read_var_bytes()?.to_vec(),
            sequence: reader.read_u32_le()?,
        });
    }

    let num_outputs = reader.read_varint_len()?;
    if num_outputs == 0 {
        return Err(InquisitorError::NoOutputs);
    }
    let mut outputs = Vec::with_capacity(num_outputs.min(reader.remaining() / 9));
    for _ in 0..num_outputs {
        outputs.push(TxOut {
            value: reader.read_u64_le()?,
            script: reader.read_var_bytes()?.to_vec(),
        });
    }

    Ok(Transaction {
        version,
        inputs,
        outputs,
        lock_time: reader.read_u32_le()?,
    })
}

/// Decode a whole block. Every byte must belong to the header or a transaction.
pub fn decode_block(bytes: &[u8]) -> Result<Block> {
    let mut reader = Reader::new(bytes);
    let header = read_header(&mut reader)?;
    let num_txs = reader.read_varint_len()?;
    let mut transactions = Vec::with_capacity(num_txs.min(reader.remaining() / 60));
    for _ in 0..num_txs {
        transactions.push(read_transaction(&mut reader)?);
    }
    if !reader.is_empty() {
        return Err(InquisitorError::TrailingBytes {
            parsed: reader.position(),
            length: bytes.len(),
        });
    }
    Ok(Block { header, transactions })
}

/// Decode, classify and derive addresses for one script, each only if requested.
fn script_fields(
    script: &[u8],
    want_parsed: bool,
    want_format: bool,
    want_addresses: bool,
    coinbase: bool,
    versions: &AddressVersions,
) -> (Option<DecodedScript>, Option<ScriptFormat>, Option<Vec<Address>>) {
    if !(want_parsed || want_format || want_addresses) {
        return (None, None, None);
    }

    let decoded: DecodedScript = Script::decode(script).map_err(|e| e.to_string());
    // Coinbase input scripts are free-form and carry no address
    let format = match &decoded {
        Ok(parsed) if !coinbase => classify(parsed),
        _ => ScriptFormat::NonStandard,
    };
    let addresses = want_addresses.then(|| format.addresses(versions));

    (
        want_parsed.then_some(decoded),
        want_format.then_some(format),
        addresses,
    )
}

/// Parse one transaction from the front of `bytes`, populating only the fields
/// in `fields`. Returns the transaction and the number of bytes it occupied.
pub fn parse_transaction(
    bytes: &[u8],
    fields: BlockFields,
    versions: &AddressVersions,
) -> Result<(ParsedTransaction, usize)> {
    let mut reader = Reader::new(bytes);
    let tx = read_parsed_transaction(&mut reader, fields, versions)?;
    Ok((tx, reader.position()))
}

fn read_parsed_transaction(
    reader: &mut Reader<'_>,
    fields: BlockFields,
    versions: &AddressVersions,
) -> Result<ParsedTransaction> {
    let start = reader.position();
    let mut tx = ParsedTransaction::default();
    let want_inputs = fields.intersects(BlockFields::TXIN);
    let want_outputs = fields.intersects(BlockFields::TXOUT);

    let version = reader.read_i32_le()?;
    if fields.contains(BlockFields::TX_VERSION) {
        tx.version = Some(version);
    }

    let num_inputs = reader.read_varint()?;
    if num_inputs == 0 {
        return Err(InquisitorError::NoInputs);
    }
    if fields.contains(BlockFields::NUM_TX_INPUTS) {
        tx.num_inputs = Some(num_inputs);
    }

    for _ in 0..num_inputs {
        let prev_tx_hash = reader.read_hash()?;
        let prev_output_index = reader.read_u32_le()?;
        let script = reader.read_var_bytes()?;
        let sequence = reader.read_u32_le()?;
        if !want_inputs {
            continue;
        }

        let coinbase = prev_tx_hash == [0u8; 32] && prev_output_index == crate::constants::COINBASE_INDEX;
        let (parsed_script, script_format, addresses) = script_fields(
            script,
            fields.contains(BlockFields::TXIN_PARSED_SCRIPT),
            fields.contains(BlockFields::TXIN_SCRIPT_FORMAT),
            fields.contains(BlockFields::TXIN_ADDRESSES),
            coinbase,
            versions,
        );
        tx.inputs.push(ParsedTxIn {
            prev_tx_hash: fields.contains(BlockFields::TXIN_HASH).then_some(prev_tx_hash),
            prev_output_index: fields.contains(BlockFields::TXIN_INDEX).then_some(prev_output_index),
            script_length: fields.contains(BlockFields::TXIN_SCRIPT_LENGTH).then_some(script.len()),
            script: fields.contains(BlockFields::TXIN_SCRIPT).then(|| script.to_vec()),
            parsed_script,
            script_format,
            addresses,
            sequence: fields.contains(BlockFields::TXIN_SEQUENCE_NUM).then_some(sequence),
        });
    }

    let num_outputs = reader.read_varint()?;
    if num_outputs == 0 {
        return Err(InquisitorError::NoOutputs);
    }
    if fields.contains(BlockFields::NUM_TX_OUTPUTS) {
        tx.num_outputs = Some(num_outputs);
    }

    for _ in 0..num_outputs {
        let value = reader.read_u64_le()?;
        let script = reader.read_var_bytes()?;
        if !want_outputs {
            continue;
        }

        let (parsed_script, script_format, addresses) = script_fields(
            script,
            fields.contains(BlockFields::TXOUT_PARSED_SCRIPT),
            fields.contains(BlockFields::TXOUT_SCRIPT_FORMAT),
            fields.contains(BlockFields::TXOUT_ADDRESSES),
            false,
            versions,
        );
        tx.outputs.push(ParsedTxOut {
            value: fields.contains(BlockFields::TXOUT_FUNDS).then_some(value),
            script_length: fields.contains(BlockFields::TXOUT_SCRIPT_LENGTH).then_some(script.len()),
            script: fields.contains(BlockFields::TXOUT_SCRIPT).then(|| script.to_vec()),
            parsed_script,
            script_format,
            addresses,
        });
    }

    let lock_time = reader.read_u32_le()?;
    if fields.contains(BlockFields::TX_LOCK_TIME) {
        tx.lock_time = Some(lock_time);
    }

    let tx_bytes = reader.consumed_since(start);
    if fields.contains(BlockFields::TX_HASH) {
        tx.hash = Some(reversed(&double_sha256(tx_bytes)));
    }
    if fields.contains(BlockFields::TX_BYTES) {
        tx.bytes = Some(tx_bytes.to_vec());
    }
    if fields.contains(BlockFields::TX_SIZE) {
        tx.size = Some(tx_bytes.len());
    }

    Ok(tx)
}

/// Parse a block, populating only the fields in `fields`.
///
/// 1. Header fields come from the first 80 bytes; a header-only request never
///    looks past them
/// 2. The transaction count is read only if it or a transaction field is requested
/// 3. Transactions are walked only if a transaction field is requested; once
///    every transaction is walked the block must be exhausted
pub fn parse_block(bytes: &[u8], fields: BlockFields, versions: &AddressVersions) -> Result<ParsedBlock> {
    let mut block = ParsedBlock::default();
    let mut pending = fields;

    if fields.contains(BlockFields::BLOCK_SIZE) {
        block.block_size = Some(bytes.len());
        pending.remove(BlockFields::BLOCK_SIZE);
    }
    if pending.is_empty() {
        return Ok(block);
    }

    let mut reader = Reader::new(bytes);
    let header_bytes = reader.take(HEADER_SIZE)?;
    let header = decode_header(header_bytes)?;

    if fields.contains(BlockFields::BLOCK_HASH) {
        block.block_hash = Some(reversed(&double_sha256(header_bytes)));
    }
    if fields.contains(BlockFields::FORMAT_VERSION) {
        block.format_version = Some(header.version);
    }
    if fields.contains(BlockFields::PREVIOUS_BLOCK_HASH) {
        block.previous_block_hash = Some(header.previous_block_hash);
    }
    if fields.contains(BlockFields::MERKLE_ROOT) {
        block.merkle_root = Some(header.merkle_root);
    }
    if fields.contains(BlockFields::TIMESTAMP) {
        block.timestamp = Some(header.timestamp);
    }
    if fields.contains(BlockFields::BITS) {
        block.bits = Some(header.bits);
    }
    if fields.contains(BlockFields::TARGET) {
        block.target = Some(bits_to_target(header.bits)?);
    }
    if fields.contains(BlockFields::DIFFICULTY) {
        block.difficulty = Some(bits_to_difficulty(header.bits)?);
    }
    if fields.contains(BlockFields::NONCE) {
        block.nonce = Some(header.nonce);
    }
    pending.remove(BlockFields::HEADER);
    if pending.is_empty() {
        return Ok(block);
    }

    let num_txs = reader.read_varint()?;
    if fields.contains(BlockFields::NUM_TXS) {
        block.num_txs = Some(num_txs);
    }
    pending.remove(BlockFields::NUM_TXS);
    if pending.is_empty() {
        return Ok(block);
    }

    for index in 0..num_txs {
        let start = reader.position();
        let tx = read_parsed_transaction(&mut reader, fields, versions)?;
        trace!(index, offset = start, len = reader.position() - start, "parsed transaction");
        block.transactions.push(tx);
    }
    if !reader.is_empty() {
        return Err(InquisitorError::TrailingBytes {
            parsed: reader.position(),
            length: bytes.len(),
        });
    }

    Ok(block)
}

/// One framed block inside a byte window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Offset of the magic bytes within the window
    pub offset: usize,
    pub block: &'a [u8],
}

/// Iterator over `magic ‖ length ‖ block` frames.
///
/// Iteration ends at the end of the window or at an all-zero tail (block files
/// are pre-allocated with zeros). The first error ends iteration; [`BlockFrames::consumed`]
/// then reports where the last complete frame ended so the caller can refill
/// the window from there.
#[derive(Debug, Clone)]
pub struct BlockFrames<'a> {
    window: &'a [u8],
    pos: usize,
    magic: [u8; 4],
    max_block_size: usize,
    finished: bool,
}

impl<'a> BlockFrames<'a> {
    pub fn new(window: &'a [u8], magic: [u8; 4], max_block_size: usize) -> Self {
        BlockFrames {
            window,
            pos: 0,
            magic,
            max_block_size,
            finished: false,
        }
    }

    /// Bytes fully consumed by the frames yielded so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    fn next_frame(&mut self) -> Option<Result<Frame<'a>>> {
        let rest = &self.window[self.pos..];
        if rest.iter().all(|&b| b == 0) {
            return None;
        }
        if rest.len() < FRAME_PREFIX_SIZE {
            return Some(Err(InquisitorError::IncompleteBlock {
                declared: FRAME_PREFIX_SIZE,
                available: rest.len(),
            }));
        }

        let mut reader = Reader::new(rest);
        let magic = match reader.take(4) {
            Ok(magic) => magic,
            Err(e) => return Some(Err(e)),
        };
        if magic != self.magic {
            return Some(Err(InquisitorError::MagicMismatch {
                expected: hex::encode(self.magic),
                found: hex::encode(magic),
                offset: self.pos,
            }));
        }
        let declared = match reader.read_u32_le() {
            Ok(len) => len as usize,
            Err(e) => return Some(Err(e)),
        };
        if declared > self.max_block_size {
            return Some(Err(InquisitorError::BlockTooLarge {
                declared,
                limit: self.max_block_size,
                knob: "max_block_size",
            }));
        }
        let block = match reader.take(declared) {
            Ok(block) => block,
            Err(_) => {
                return Some(Err(InquisitorError::IncompleteBlock {
                    declared,
                    available: reader.remaining(),
                }))
            }
        };

        let frame = Frame { offset: self.pos, block };
        self.pos += FRAME_PREFIX_SIZE + declared;
        Some(Ok(frame))
    }
}

impl<'a> Iterator for BlockFrames<'a> {
    type Item = Result<Frame<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.next_frame();
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}
