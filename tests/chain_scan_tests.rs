//! Scanning a framed block stream across window boundaries

use block_inquisitor::chain::{ChainTableConfig, SENTINEL_HEIGHT};
use block_inquisitor::constants::{COINBASE_INDEX, SEQUENCE_FINAL};
use block_inquisitor::merkle::build_root;
use block_inquisitor::pow::valid_pow;
use block_inquisitor::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_test_writer()
        .try_init();
}

fn regtest() -> InquisitorConfig {
    InquisitorConfig::from_json(r#"{ "network": "regtest" }"#).unwrap()
}

fn coinbase(tag: u32) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            prevout: OutPoint {
                hash: [0; 32],
                index: COINBASE_INDEX,
            },
            script: tag.to_le_bytes().to_vec(),
            sequence: SEQUENCE_FINAL,
        }],
        outputs: vec![TxOut {
            value: 50,
            script: vec![0x51],
        }],
        lock_time: 0,
    }
}

fn mine(previous_block_hash: Hash, tag: u32) -> Block {
    let transactions = vec![coinbase(tag)];
    let mut block = Block {
        header: BlockHeader {
            version: 1,
            previous_block_hash,
            merkle_root: build_root(&[transactions[0].hash()]),
            timestamp: 1_296_688_602 + tag,
            bits: 0x207fffff,
            nonce: 0,
        },
        transactions,
    };
    while !valid_pow(&block.hash(), block.header.bits) {
        block.header.nonce += 1;
    }
    block
}

fn chain(length: u32) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut parent = [0u8; 32];
    for tag in 0..length {
        let block = mine(parent, tag);
        parent = block.hash();
        blocks.push(block);
    }
    blocks
}

fn stream(blocks: &[Block]) -> Vec<u8> {
    let magic = NetworkParams::regtest().magic;
    let mut out = Vec::new();
    for block in blocks {
        let bytes = block.serialize();
        out.extend_from_slice(&magic);
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&bytes);
    }
    out
}

/// Scan `data` in windows of at most `window_size` bytes, refilling from the
/// consumed position each time.
fn scan_in_windows(scanner: &mut ChainScanner, data: &[u8], window_size: usize) -> Vec<ScanReport> {
    let mut reports = Vec::new();
    let mut start = 0usize;
    while start < data.len() {
        let end = (start + window_size).min(data.len());
        let report = scanner.scan_window(&data[start..end]);
        let progressed = report.consumed > 0;
        start += report.consumed;
        let stuck = !report.needs_more_data() && report.stopped.is_some();
        reports.push(report);
        if stuck || (!progressed && end == data.len()) {
            break;
        }
        assert!(progressed, "window of {window_size} bytes too small for one block");
    }
    reports
}

// ============================================================================
// WINDOWED SCANS
// ============================================================================

#[test]
fn test_heights_independent_of_window_size() {
    init_tracing();
    let blocks = chain(12);
    let data = stream(&blocks);
    let block_frame = data.len() / blocks.len();

    for window_size in [block_frame, block_frame + 7, 3 * block_frame - 1, data.len()] {
        let mut scanner = ChainScanner::new(regtest()).unwrap();
        let reports = scan_in_windows(&mut scanner, &data, window_size);

        let heights: Vec<i64> = reports.iter().flat_map(|r| r.blocks.iter().map(|b| b.height)).collect();
        assert_eq!(heights, (0..12).collect::<Vec<i64>>(), "window size {window_size}");
        assert_eq!(scanner.stream_offset(), data.len() as u64);
        assert_eq!(scanner.chain().tip(), blocks[11].hash());
        assert!(reports.iter().all(|r| r.failure_count() == 0));
    }
}

#[test]
fn test_block_offsets_are_absolute() {
    let blocks = chain(4);
    let data = stream(&blocks);
    let frame_len = (data.len() / 4) as u64;

    let mut scanner = ChainScanner::new(regtest()).unwrap();
    let reports = scan_in_windows(&mut scanner, &data, (frame_len + 1) as usize);
    let offsets: Vec<u64> = reports.iter().flat_map(|r| r.blocks.iter().map(|b| b.offset)).collect();
    assert_eq!(offsets, vec![0, frame_len, 2 * frame_len, 3 * frame_len]);
}

#[test]
fn test_gap_in_stream_reports_missing_parent() {
    init_tracing();
    let blocks = chain(5);
    let mut data = stream(&blocks[..2]);
    let resume_at = data.len() as u64;
    data.extend_from_slice(&stream(&blocks[3..]));

    let mut scanner = ChainScanner::new(regtest()).unwrap();
    let report = scanner.scan_window(&data);
    assert_eq!(report.blocks.len(), 2);
    let stopped = report.stopped.unwrap();
    assert_eq!(stopped.error.category(), ErrorCategory::ChainContinuity);
    assert_eq!(stopped.offset, resume_at);
    assert_eq!(stopped.height, 1);

    // Once the missing block is supplied the scan continues
    let report = scanner.scan_window(&stream(&blocks[2..]));
    assert!(report.stopped.is_none());
    assert_eq!(report.blocks.last().map(|b| b.height), Some(4));
}

#[test]
fn test_oversized_block_names_the_knob() {
    let blocks = chain(1);
    let data = stream(&blocks);
    let config = InquisitorConfig {
        max_block_size: 64,
        ..regtest()
    };
    let mut scanner = ChainScanner::new(config).unwrap();
    let report = scanner.scan_window(&data);
    let stopped = report.stopped.unwrap();
    assert_eq!(stopped.error.category(), ErrorCategory::ResourceLimitExceeded);
    assert!(stopped.error.to_string().contains("max_block_size"));
    assert_eq!(stopped.height, SENTINEL_HEIGHT);
}

#[test]
fn test_non_final_transaction_flagged_at_its_height() {
    let mut blocks = chain(3);
    let mut locked = coinbase(77);
    locked.inputs[0].prevout = OutPoint { hash: [5; 32], index: 0 };
    locked.inputs[0].sequence = 0;
    locked.lock_time = 2;

    // Height 2 has not passed lock time 2 yet
    let mut third = mine(blocks[1].hash(), 2);
    third.transactions.push(locked);
    third.header.merkle_root = build_root(&third.tx_hashes());
    while !valid_pow(&third.hash(), third.header.bits) {
        third.header.nonce += 1;
    }
    blocks[2] = third;

    let mut scanner = ChainScanner::new(regtest()).unwrap();
    let report = scanner.scan_window(&stream(&blocks));
    assert!(report.stopped.is_none());
    assert_eq!(report.blocks[2].height, 2);
    assert_eq!(
        report.blocks[2].failures,
        vec![ValidationFailure::NonFinalTransaction {
            tx_index: 1,
            lock_time: 2,
        }]
    );
    assert_eq!(report.failure_count(), 1);
}

// ============================================================================
// CHAIN TABLE
// ============================================================================

#[test]
fn test_table_stays_bounded_on_long_scans() {
    let mut config = regtest();
    config.chain = ChainTableConfig {
        prune_threshold: 20,
        keep_last_n: 5,
    };
    let blocks = chain(60);
    let mut scanner = ChainScanner::new(config).unwrap();
    let report = scanner.scan_window(&stream(&blocks));

    assert!(report.stopped.is_none());
    assert_eq!(report.blocks.len(), 60);
    assert!(scanner.chain().len() <= 21);
    assert_eq!(scanner.chain().max_height(), 59);
    assert!(scanner.chain().contains(&blocks[59].hash()));
    assert!(!scanner.chain().contains(&blocks[0].hash()));
}

#[test]
fn test_fork_resolved_and_orphan_reported() {
    init_tracing();
    let mut config = regtest();
    config.orphan_confirmations = 3;
    let main = chain(8);
    let fork_a = mine(main[2].hash(), 1000);
    let fork_b = mine(fork_a.hash(), 1001);

    let mut data = stream(&main[..3]);
    data.extend_from_slice(&stream(&[fork_a.clone(), fork_b.clone()]));
    data.extend_from_slice(&stream(&main[3..]));

    let mut scanner = ChainScanner::new(config).unwrap();
    let report = scanner.scan_window(&data);
    assert!(report.stopped.is_none());
    assert_eq!(scanner.chain().height_of(&fork_b.hash()), Some(4));
    assert_eq!(scanner.chain().tip(), main[7].hash());
    assert_eq!(report.orphans, vec![(3, fork_a.hash()), (4, fork_b.hash())]);
}

#[test]
fn test_resume_mid_chain() {
    let blocks = chain(6);
    let mut scanner = ChainScanner::resume_from(regtest(), &blocks[2].header, 702_000).unwrap();
    let report = scanner.scan_window(&stream(&blocks[3..]));
    let heights: Vec<i64> = report.blocks.iter().map(|b| b.height).collect();
    assert_eq!(heights, vec![702_001, 702_002, 702_003]);
}
