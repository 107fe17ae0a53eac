//! Bitcoin wire-format and consensus constants

/// Serialized block header size
pub const HEADER_SIZE: usize = 80;

/// Bytes of on-disk framing before each block: magic(4) + length(4)
pub const FRAME_PREFIX_SIZE: usize = 8;

/// Default in-memory processing window for a single block: 1 MiB
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 1024 * 1024;

/// Previous-output index marking a coinbase input
pub const COINBASE_INDEX: u32 = 0xffffffff;

/// Blocks before a coinbase output may be spent
pub const COINBASE_MATURITY: u64 = 100;

/// Satoshis per BTC
pub const SATOSHIS_PER_BTC: u64 = 100_000_000;

/// Initial block subsidy: 50 BTC
pub const INITIAL_SUBSIDY: u64 = 50 * SATOSHIS_PER_BTC;

/// Halving interval: 210,000 blocks
pub const HALVING_INTERVAL: u64 = 210_000;

/// Difficulty adjustment interval: 2016 blocks
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 2016;

/// Target timespan of one adjustment interval: two weeks in seconds
pub const TARGET_TIMESPAN: u64 = 14 * 24 * 60 * 60;

/// Compact bits of the genesis block and the first retarget period
pub const INITIAL_BITS: u32 = 0x1d00ffff;

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single pushed stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum combined depth of main stack and alt stack
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of counted (non-push) operations per script
pub const MAX_SCRIPT_OPS: usize = 200;

/// Maximum public keys in one CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Maximum byte length of a script number operand
pub const MAX_SCRIPT_NUM_SIZE: usize = 4;

/// Timestamp from which pay-to-script-hash (BIP16) redeem scripts are evaluated
pub const P2SH_ACTIVATION_TIME: u32 = 1_329_264_000;

/// Lock time threshold: lock times below this are block heights
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number for a final input
pub const SEQUENCE_FINAL: u32 = 0xffffffff;
