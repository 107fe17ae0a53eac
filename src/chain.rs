//! Chain-position tracking
//!
//! Maps block hash → (height, parent) while a scan walks a byte stream. The
//! table is an explicit value owned by the caller; registrations must happen in
//! an order where every parent precedes its children.

use crate::codec::hash_to_hex;
use crate::error::{InquisitorError, Result};
use crate::types::Hash;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Height of the zero-hash sentinel every chain starts from.
pub const SENTINEL_HEIGHT: i64 = -1;

/// Size bounds for a [`ChainPositionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainTableConfig {
    /// Entry count above which a registration triggers an automatic prune
    pub prune_threshold: usize,
    /// Heights below the maximum retained by a prune
    pub keep_last_n: u64,
}

impl Default for ChainTableConfig {
    fn default() -> Self {
        ChainTableConfig {
            prune_threshold: 1000,
            keep_last_n: crate::constants::COINBASE_MATURITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub height: i64,
    pub previous_block_hash: Hash,
}

#[derive(Debug, Clone)]
pub struct ChainPositionTable {
    entries: HashMap<Hash, ChainEntry>,
    config: ChainTableConfig,
    tip: Hash,
    max_height: i64,
}

impl Default for ChainPositionTable {
    fn default() -> Self {
        ChainPositionTable::new(ChainTableConfig::default())
    }
}

impl ChainPositionTable {
    /// A table holding only the zero-hash sentinel at height −1.
    pub fn new(config: ChainTableConfig) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            [0u8; 32],
            ChainEntry {
                height: SENTINEL_HEIGHT,
                previous_block_hash: [0u8; 32],
            },
        );
        ChainPositionTable {
            entries,
            config,
            tip: [0u8; 32],
            max_height: SENTINEL_HEIGHT,
        }
    }

    /// Seed a table that resumes a scan at a known block.
    pub fn resume_from(config: ChainTableConfig, block_hash: Hash, height: i64) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            block_hash,
            ChainEntry {
                height,
                previous_block_hash: [0u8; 32],
            },
        );
        ChainPositionTable {
            entries,
            config,
            tip: block_hash,
            max_height: height,
        }
    }

    /// Register: ℍ × ℍ → ℤ
    ///
    /// height = table[previous_block_hash] + 1. Registering a known hash
    /// again returns its recorded height.
    pub fn register(&mut self, block_hash: Hash, previous_block_hash: Hash) -> Result<i64> {
        if let Some(entry) = self.entries.get(&block_hash) {
            return Ok(entry.height);
        }

        let parent = self
            .entries
            .get(&previous_block_hash)
            .ok_or_else(|| InquisitorError::OrphanParentMissing {
                block_hash: hash_to_hex(&block_hash),
                previous_block_hash: hash_to_hex(&previous_block_hash),
            })?;
        let height = parent.height + 1;

        self.entries.insert(
            block_hash,
            ChainEntry {
                height,
                previous_block_hash,
            },
        );
        if height > self.max_height {
            self.max_height = height;
            self.tip = block_hash;
        }
        debug!(hash = %hash_to_hex(&block_hash), height, "registered block");

        if self.entries.len() > self.config.prune_threshold {
            self.prune(self.config.keep_last_n);
        }
        Ok(height)
    }

    pub fn height_of(&self, block_hash: &Hash) -> Option<i64> {
        self.entries.get(block_hash).map(|entry| entry.height)
    }

    pub fn get(&self, block_hash: &Hash) -> Option<&ChainEntry> {
        self.entries.get(block_hash)
    }

    pub fn contains(&self, block_hash: &Hash) -> bool {
        self.entries.contains_key(block_hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Greatest registered height (−1 for a fresh table).
    pub fn max_height(&self) -> i64 {
        self.max_height
    }

    /// The first block registered at [`ChainPositionTable::max_height`].
    pub fn tip(&self) -> Hash {
        self.tip
    }

    /// Drop every entry more than `keep_last_n` heights below the maximum.
    ///
    /// A block whose parent has been pruned can no longer be registered, so
    /// `keep_last_n` must cover the deepest plausible reorganization.
    pub fn prune(&mut self, keep_last_n: u64) -> usize {
        let floor = self.max_height.saturating_sub(keep_last_n.min(i64::MAX as u64) as i64);
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.height >= floor);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, floor, "pruned chain position table");
        }
        dropped
    }

    /// Hashes on the path from `tip` back through known parents.
    fn main_chain(&self, tip: &Hash) -> Vec<Hash> {
        let mut path = Vec::new();
        let mut cursor = *tip;
        while let Some(entry) = self.entries.get(&cursor) {
            path.push(cursor);
            if entry.height == SENTINEL_HEIGHT || entry.previous_block_hash == cursor {
                break;
            }
            cursor = entry.previous_block_hash;
        }
        path
    }

    /// DetectOrphans: ℍ × ℕ → (ℤ × ℍ)*
    ///
    /// Every entry not on the path from `tip` back through its ancestors is an
    /// orphan once it sits at least `threshold_confirmations` below the maximum
    /// height. Results are ordered by height.
    pub fn detect_orphans(&self, tip: &Hash, threshold_confirmations: u64) -> Vec<(i64, Hash)> {
        let main_chain: std::collections::HashSet<Hash> = self.main_chain(tip).into_iter().collect();
        let mut orphans: Vec<(i64, Hash)> = self
            .entries
            .iter()
            .filter(|(hash, entry)| {
                entry.height != SENTINEL_HEIGHT
                    && !main_chain.contains(*hash)
                    && (self.max_height - entry.height) as u64 >= threshold_confirmations
            })
            .map(|(hash, entry)| (entry.height, *hash))
            .collect();
        orphans.sort();
        orphans
    }
}
