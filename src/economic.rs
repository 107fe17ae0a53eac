//! Block subsidy, supply and fee arithmetic

use crate::constants::*;
use crate::types::Transaction;

/// MiningReward: ℕ → ℕ
///
/// Formula: subsidy = 50 × C × 2^(−⌊h/H⌋)
/// Where:
/// - h = block height
/// - H = HALVING_INTERVAL (210,000)
/// - C = SATOSHIS_PER_BTC (10^8)
pub fn mining_reward(height: u64) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    // The subsidy has shifted to zero long before 64 halvings
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

/// Sum of every block subsidy from the genesis block up to and including `height`.
pub fn total_supply(height: u64) -> u64 {
    let mut total = 0u64;
    let mut start = 0u64;
    while start <= height {
        let reward = mining_reward(start);
        if reward == 0 {
            break;
        }
        let period_end = (start / HALVING_INTERVAL + 1) * HALVING_INTERVAL - 1;
        let blocks = period_end.min(height) - start + 1;
        total += reward * blocks;
        start = period_end + 1;
    }
    total
}

/// Fee = Σ spent output values − Σ output values.
///
/// `prev_values[i]` is the value of the output spent by input `i`. Returns
/// `None` when the counts differ or a sum overflows. A coinbase pays no fee.
pub fn transaction_fee(tx: &Transaction, prev_values: &[u64]) -> Option<i128> {
    if tx.is_coinbase() {
        return Some(0);
    }
    if prev_values.len() != tx.inputs.len() {
        return None;
    }
    let total_in = prev_values.iter().try_fold(0u64, |acc, &v| acc.checked_add(v))?;
    let total_out = tx.total_output_value()?;
    Some(total_in as i128 - total_out as i128)
}

/// Most a coinbase at `height` may claim given the fees of its block.
pub fn coinbase_allowance(height: u64, fees: u64) -> u64 {
    mining_reward(height).saturating_add(fees)
}
