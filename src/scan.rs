//! Windowed batch scanning of a raw block stream
//!
//! A [`ChainScanner`] is fed consecutive byte windows cut from block files. For
//! each framed block it decodes, registers the block in its chain table and
//! validates it. Validation failures are collected; malformed input or an
//! unknown parent stops the window with a diagnostic naming the absolute byte
//! offset and the last height reached. The caller starts the next window at
//! [`ScanReport::consumed`] bytes past the start of the previous one.

use crate::block::{decode_block, BlockFrames, Frame};
use crate::chain::ChainPositionTable;
use crate::codec::hash_to_hex;
use crate::config::InquisitorConfig;
use crate::constants::{DIFFICULTY_ADJUSTMENT_INTERVAL, FRAME_PREFIX_SIZE};
use crate::error::{InquisitorError, Result};
use crate::types::{BlockHeader, Hash};
use crate::validation::{log_failures, valid_bits, validate_block, ValidationFailure};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, trace, warn};

/// One block decoded from a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannedBlock {
    /// Absolute stream offset of the block's magic bytes
    pub offset: u64,
    pub height: i64,
    pub block_hash: Hash,
    pub size: usize,
    pub num_txs: usize,
    pub failures: Vec<ValidationFailure>,
}

/// Why a window stopped before its end.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanDiagnostic {
    /// Absolute stream offset of the frame that could not be processed
    pub offset: u64,
    /// Highest height registered when the scan stopped
    pub height: i64,
    pub error: InquisitorError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub blocks: Vec<ScannedBlock>,
    /// Bytes of the window fully processed
    pub consumed: usize,
    pub stopped: Option<ScanDiagnostic>,
    /// Blocks newly found off the main chain, `(height, hash)`
    pub orphans: Vec<(i64, Hash)>,
}

impl ScanReport {
    pub fn failure_count(&self) -> usize {
        self.blocks.iter().map(|block| block.failures.len()).sum()
    }

    /// The window ended inside a frame; refill from `consumed` and scan again.
    pub fn needs_more_data(&self) -> bool {
        matches!(
            self.stopped,
            Some(ScanDiagnostic {
                error: InquisitorError::IncompleteBlock { .. },
                ..
            })
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct HeaderSummary {
    bits: u32,
    timestamp: u32,
}

/// Stateful scanner over consecutive windows of one block stream.
#[derive(Debug, Clone)]
pub struct ChainScanner {
    config: InquisitorConfig,
    chain: ChainPositionTable,
    /// Bits and timestamp of every block still in the chain table
    headers: HashMap<Hash, HeaderSummary>,
    /// Timestamp of the first block of each retarget period, by height
    period_starts: BTreeMap<i64, u32>,
    reported_orphans: HashSet<Hash>,
    stream_offset: u64,
}

impl ChainScanner {
    pub fn new(config: InquisitorConfig) -> Result<Self> {
        config.validate()?;
        let chain = ChainPositionTable::new(config.chain);
        Ok(Self::with_chain(config, chain))
    }

    /// Continue a scan after `block_hash` at `height`, whose header is known.
    pub fn resume_from(config: InquisitorConfig, header: &BlockHeader, height: i64) -> Result<Self> {
        config.validate()?;
        let block_hash = header.hash();
        let chain = ChainPositionTable::resume_from(config.chain, block_hash, height);
        let mut scanner = Self::with_chain(config, chain);
        scanner.headers.insert(
            block_hash,
            HeaderSummary {
                bits: header.bits,
                timestamp: header.timestamp,
            },
        );
        Ok(scanner)
    }

    fn with_chain(config: InquisitorConfig, chain: ChainPositionTable) -> Self {
        ChainScanner {
            config,
            chain,
            headers: HashMap::new(),
            period_starts: BTreeMap::new(),
            reported_orphans: HashSet::new(),
            stream_offset: 0,
        }
    }

    pub fn config(&self) -> &InquisitorConfig {
        &self.config
    }

    pub fn chain(&self) -> &ChainPositionTable {
        &self.chain
    }

    /// Absolute offset the next window is expected to start at.
    pub fn stream_offset(&self) -> u64 {
        self.stream_offset
    }

    /// Process every complete frame in `window`.
    pub fn scan_window(&mut self, window: &[u8]) -> ScanReport {
        let mut report = ScanReport::default();
        let frames = BlockFrames::new(window, self.config.network.magic, self.config.max_block_size);

        for item in frames {
            let frame = match item {
                Ok(frame) => frame,
                Err(error) => {
                    report.stopped = Some(self.diagnostic(report.consumed, error));
                    break;
                }
            };
            debug!(
                offset = self.stream_offset + frame.offset as u64,
                length = frame.block.len(),
                "framed block"
            );
            match self.process_frame(&frame) {
                Ok(block) => {
                    report.consumed = frame.offset + FRAME_PREFIX_SIZE + frame.block.len();
                    report.blocks.push(block);
                }
                Err(error) => {
                    report.stopped = Some(self.diagnostic(frame.offset, error));
                    break;
                }
            }
        }

        report.orphans = self.new_orphans();
        self.stream_offset += report.consumed as u64;

        info!(
            blocks = report.blocks.len(),
            failures = report.failure_count(),
            orphans = report.orphans.len(),
            consumed = report.consumed,
            height = self.chain.max_height(),
            "scanned window"
        );
        report
    }

    fn diagnostic(&self, window_offset: usize, error: InquisitorError) -> ScanDiagnostic {
        let diagnostic = ScanDiagnostic {
            offset: self.stream_offset + window_offset as u64,
            height: self.chain.max_height(),
            error,
        };
        if !matches!(diagnostic.error, InquisitorError::IncompleteBlock { .. }) {
            warn!(
                offset = diagnostic.offset,
                height = diagnostic.height,
                "scan stopped: {}",
                diagnostic.error
            );
        }
        diagnostic
    }

    fn process_frame(&mut self, frame: &Frame<'_>) -> Result<ScannedBlock> {
        let block = decode_block(frame.block)?;
        let block_hash = block.hash();
        trace!(hash = %hash_to_hex(&block_hash), txs = block.transactions.len(), "decoded block");

        let height = self.chain.register(block_hash, block.header.previous_block_hash)?;

        let mut failures = validate_block(
            &block,
            height.max(0) as u64,
            frame.block.len(),
            self.config.max_block_size,
            &self.config.network,
        );
        if let Some(failure) = self.check_bits(height, &block.header) {
            failures.push(failure);
        }
        log_failures(&block_hash, Some(height), &failures);

        self.remember_header(block_hash, height, &block.header);

        Ok(ScannedBlock {
            offset: self.stream_offset + frame.offset as u64,
            height,
            block_hash,
            size: frame.block.len(),
            num_txs: block.transactions.len(),
            failures,
        })
    }

    /// Retarget check against the parent's bits, skipped when the history
    /// it needs has not been seen.
    fn check_bits(&self, height: i64, header: &BlockHeader) -> Option<ValidationFailure> {
        if !self.config.network.enforce_retarget || height < 0 {
            return None;
        }
        let interval = DIFFICULTY_ADJUSTMENT_INTERVAL as i64;
        if height < interval {
            return valid_bits(height as u64, header.bits, header.bits, 0, 0);
        }
        let parent = self.headers.get(&header.previous_block_hash)?;
        let period_first_time = if height % interval == 0 {
            *self.period_starts.get(&(height - interval))?
        } else {
            0
        };
        valid_bits(
            height as u64,
            header.bits,
            parent.bits,
            period_first_time,
            parent.timestamp,
        )
    }

    fn remember_header(&mut self, block_hash: Hash, height: i64, header: &BlockHeader) {
        self.headers.insert(
            block_hash,
            HeaderSummary {
                bits: header.bits,
                timestamp: header.timestamp,
            },
        );
        let interval = DIFFICULTY_ADJUSTMENT_INTERVAL as i64;
        if height % interval == 0 {
            self.period_starts.insert(height, header.timestamp);
            // The period before the previous one is no longer needed
            let floor = height - interval;
            self.period_starts.retain(|&start, _| start >= floor);
        }
        if self.headers.len() > self.chain.len() {
            let chain = &self.chain;
            self.headers.retain(|hash, _| chain.contains(hash));
        }
    }

    fn new_orphans(&mut self) -> Vec<(i64, Hash)> {
        let orphans: Vec<(i64, Hash)> = self
            .chain
            .detect_orphans(&self.chain.tip(), self.config.orphan_confirmations)
            .into_iter()
            .filter(|(_, hash)| !self.reported_orphans.contains(hash))
            .collect();
        for (height, hash) in &orphans {
            warn!(height, hash = %hash_to_hex(hash), "orphaned block");
            self.reported_orphans.insert(*hash);
        }
        let chain = &self.chain;
        self.reported_orphans.retain(|hash| chain.contains(hash));
        orphans
    }
}
