//! Block id ordering and round-trip edge cases.

use blobwriter_core::{BlockId, Checkpoint, MAX_PARTITION, MAX_SEQUENCE};

#[test]
fn test_lexical_order_matches_numeric_order() {
    let mut ids: Vec<BlockId> = Vec::new();
    for txid in [0_u64, 9, 10, 99, 100, u64::MAX] {
        for seq in [0_u32, 1, 9, 10, 11, 100_000, MAX_SEQUENCE] {
            ids.push(BlockId::new(17, txid, seq).unwrap());
        }
    }

    let mut by_value = ids.clone();
    by_value.sort();

    let mut by_text: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    by_text.sort();

    let rendered: Vec<String> = by_value.iter().map(|id| id.to_string()).collect();
    assert_eq!(rendered, by_text);
}

#[test]
fn test_extremes_parse_back() {
    for id in [
        BlockId::new(0, 0, 0).unwrap(),
        BlockId::new(MAX_PARTITION, u64::MAX, MAX_SEQUENCE).unwrap(),
    ] {
        let text = id.to_string();
        assert_eq!(text.parse::<BlockId>().unwrap(), id);
    }
}

#[test]
fn test_checkpoint_recovers_full_chain() {
    // A transaction that rolled over twice checkpoints only its two ends,
    // yet the complete ordered chain is recoverable from them.
    let mut chain = vec![BlockId::first(5, 1234).unwrap()];
    for _ in 0..2 {
        let next = chain.last().unwrap().next().unwrap();
        chain.push(next);
    }

    let cp = Checkpoint::new(1234, chain[0], chain[2]).unwrap();
    assert_eq!(cp.block_ids().unwrap(), chain);
}
