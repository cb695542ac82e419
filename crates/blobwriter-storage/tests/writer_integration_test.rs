//! Integration tests for the partition write path.
//!
//! These drive `PartitionWriter` end to end against an in-memory object store
//! and check what actually lands in remote storage and in the checkpoint store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::memory::InMemory;
use object_store::ObjectStore;

use blobwriter_core::{BlockId, Checkpoint};
use blobwriter_metadata::{
    CheckpointStore, InMemoryCheckpointStore, MetadataError, SqliteCheckpointStore,
};
use blobwriter_storage::{
    block_path, BlockBackend, Error, MessageOutcome, ObjectStoreBackend, PartitionWriter,
    TransactionPhase, WriterConfig,
};

// ============================================================================
// Helpers
// ============================================================================

/// Message whose framed size (with the default `\r\n` delimiter) is `framed_len`.
fn message(fill: char, framed_len: usize) -> String {
    std::iter::repeat(fill).take(framed_len - 2).collect()
}

fn small_config() -> WriterConfig {
    WriterConfig {
        block_capacity: 100,
        max_message_size: 50,
        retry_backoff_ms: 1,
        ..Default::default()
    }
}

struct Harness {
    store: Arc<InMemory>,
    backend: Arc<ObjectStoreBackend>,
    checkpoints: Arc<InMemoryCheckpointStore>,
}

impl Harness {
    fn new(config: &WriterConfig) -> Self {
        let store = Arc::new(InMemory::new());
        let backend = Arc::new(ObjectStoreBackend::new(store.clone(), config));
        Self {
            store,
            backend,
            checkpoints: Arc::new(InMemoryCheckpointStore::default()),
        }
    }

    async fn open(&self, partition: u32, config: WriterConfig) -> PartitionWriter {
        PartitionWriter::open(
            partition,
            config,
            self.backend.clone(),
            self.checkpoints.clone(),
        )
        .await
        .unwrap()
    }

    async fn block(&self, blob: &str, id: &BlockId) -> Bytes {
        self.store
            .get(&block_path(blob, id))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap()
    }
}

/// Checkpoint store whose writes can be switched to fail.
#[derive(Default)]
struct FlakyCheckpoints {
    inner: InMemoryCheckpointStore,
    fail_writes: AtomicBool,
}

#[async_trait]
impl CheckpointStore for FlakyCheckpoints {
    async fn clear(&self, partition: u32) -> blobwriter_metadata::Result<()> {
        self.inner.clear(partition).await
    }

    async fn write(&self, checkpoint: &Checkpoint) -> blobwriter_metadata::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MetadataError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        self.inner.write(checkpoint).await
    }

    async fn read(&self, partition: u32) -> blobwriter_metadata::Result<Option<Checkpoint>> {
        self.inner.read(partition).await
    }
}

// ============================================================================
// Packing scenarios
// ============================================================================

/// Capacity 100, limit 50, three 40-byte messages: [80][40].
#[tokio::test]
async fn test_greedy_packing_rolls_over_once() {
    let config = small_config();
    let h = Harness::new(&config);
    let mut writer = h.open(0, config).await;

    let messages = [message('a', 40), message('b', 40), message('c', 40)];
    writer.start(1).unwrap();

    let mut outcomes = Vec::new();
    for m in &messages {
        outcomes.push(writer.deliver(m).await.unwrap());
    }

    let first = BlockId::first(0, 1).unwrap();
    let second = first.next().unwrap();
    assert_eq!(
        outcomes,
        vec![
            MessageOutcome::Accepted { block: first, rolled_over: false },
            MessageOutcome::Accepted { block: first, rolled_over: false },
            MessageOutcome::Accepted { block: second, rolled_over: true },
        ]
    );

    let summary = writer.finish().await.unwrap();
    assert_eq!(summary.messages, 3);
    assert_eq!(summary.dropped, 0);
    assert_eq!(summary.blocks, vec![first, second]);

    let blob = writer.blob().to_string();
    assert_eq!(h.block(&blob, &first).await.len(), 80);
    assert_eq!(h.block(&blob, &second).await.len(), 40);
}

#[tokio::test]
async fn test_empty_message_is_skipped() {
    let config = small_config();
    let h = Harness::new(&config);
    let mut writer = h.open(0, config).await;

    writer.start(1).unwrap();
    assert_eq!(writer.deliver("").await.unwrap(), MessageOutcome::Empty);

    let summary = writer.finish().await.unwrap();
    assert_eq!(summary.messages, 0);
    assert!(summary.blocks.is_empty());
    assert_eq!(summary.checkpoint, None);
    assert!(h.store.list(None).next().await.is_none());
}

#[tokio::test]
async fn test_oversize_message_dropped_transaction_completes() {
    let config = small_config();
    let h = Harness::new(&config);
    let mut writer = h.open(0, config).await;

    writer.start(1).unwrap();
    assert_eq!(
        writer.deliver(&message('x', 60)).await.unwrap(),
        MessageOutcome::Dropped { framed_len: 60 }
    );
    writer.deliver(&message('y', 20)).await.unwrap();

    let summary = writer.finish().await.unwrap();
    assert_eq!(summary.messages, 1);
    assert_eq!(summary.dropped, 1);
    assert_eq!(writer.phase(), TransactionPhase::Idle);

    let only = BlockId::first(0, 1).unwrap();
    let data = h.block(writer.blob(), &only).await;
    assert_eq!(data, Bytes::from(format!("{}\r\n", message('y', 20))));
}

/// A message exactly at the limit is accepted.
#[tokio::test]
async fn test_message_at_limit_accepted() {
    let config = small_config();
    let h = Harness::new(&config);
    let mut writer = h.open(0, config).await;

    let summary = writer
        .run_transaction(1, [message('m', 50), message('n', 50)])
        .await
        .unwrap();
    assert_eq!(summary.messages, 2);
    assert_eq!(summary.blocks.len(), 1);
}

// ============================================================================
// Invariants
// ============================================================================

/// No uploaded block exceeds capacity, and the uploaded blocks concatenated in
/// id order are exactly the accepted framed messages in delivery order.
#[tokio::test]
async fn test_capacity_and_flush_completeness() {
    let config = small_config();
    let h = Harness::new(&config);
    let mut writer = h.open(3, config.clone()).await;

    let sizes = [3, 48, 17, 44, 9, 70, 33, 33, 33, 12, 48, 2, 46, 1, 27];
    let messages: Vec<String> = sizes
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            let fill = (b'a' + i as u8) as char;
            std::iter::repeat(fill).take(len).collect()
        })
        .collect();

    let summary = writer.run_transaction(11, &messages).await.unwrap();

    let mut expected = Vec::new();
    for m in &messages {
        if config.framed_len(m) <= config.max_message_size {
            expected.extend_from_slice(m.as_bytes());
            expected.extend_from_slice(b"\r\n");
        }
    }

    let mut actual = Vec::new();
    for id in &summary.blocks {
        let data = h.block(writer.blob(), id).await;
        assert!(data.len() <= config.block_capacity);
        assert!(!data.is_empty());
        actual.extend_from_slice(&data);
    }

    assert_eq!(actual, expected);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.messages, sizes.len() as u64 - 1);

    let sequences: Vec<u32> = summary.blocks.iter().map(|id| id.sequence()).collect();
    let expected_sequences: Vec<u32> = (0..summary.blocks.len() as u32).collect();
    assert_eq!(sequences, expected_sequences);
}

#[tokio::test]
async fn test_checkpoint_names_first_and_last_block() {
    let config = small_config();
    let h = Harness::new(&config);
    let mut writer = h.open(2, config).await;

    let messages: Vec<String> = (0..7).map(|_| message('q', 45)).collect();
    let summary = writer.run_transaction(9, &messages).await.unwrap();

    let stored = h.checkpoints.read(2).await.unwrap().unwrap();
    assert_eq!(Some(stored), summary.checkpoint);
    assert_eq!(stored.transaction_id, 9);
    assert_eq!(stored.first_block, BlockId::first(2, 9).unwrap());
    assert_eq!(stored.last_block, *summary.blocks.last().unwrap());
    assert_eq!(stored.block_ids().unwrap(), summary.blocks);
}

#[tokio::test]
async fn test_committed_list_follows_transactions() {
    let config = small_config();
    let h = Harness::new(&config);
    let mut writer = h.open(0, config).await;

    let first = writer
        .run_transaction(1, [message('a', 50), message('b', 50), message('c', 50)])
        .await
        .unwrap();
    let second = writer.run_transaction(2, [message('d', 10)]).await.unwrap();

    let committed = h.backend.committed_block_list(writer.blob()).await.unwrap();
    let mut expected = first.blocks.clone();
    expected.extend(second.blocks.iter().copied());
    assert_eq!(committed, expected);
}

#[tokio::test]
async fn test_commit_disabled_leaves_blob_uncommitted() {
    let config = WriterConfig {
        commit_on_complete: false,
        ..small_config()
    };
    let h = Harness::new(&config);
    let mut writer = h.open(0, config).await;

    let summary = writer.run_transaction(1, ["hello"]).await.unwrap();
    assert!(summary.checkpoint.is_some());
    assert!(h
        .backend
        .committed_block_list(writer.blob())
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_sizing_misconfiguration_fails_transaction() {
    let config = WriterConfig {
        block_capacity: 30,
        max_message_size: 50,
        ..small_config()
    };
    let h = Harness::new(&config);
    let mut writer = h.open(0, config).await;

    writer.start(4).unwrap();
    writer.deliver(&message('a', 10)).await.unwrap();
    let err = writer.deliver(&message('b', 40)).await.unwrap_err();

    assert!(matches!(
        err,
        Error::SizingMisconfiguration { message_len: 40, block_capacity: 30 }
    ));
    assert_eq!(writer.phase(), TransactionPhase::Failed { transaction_id: 4 });
    // The current block was not closed by the rejected message.
    assert!(h.store.list(None).next().await.is_none());
    assert_eq!(h.checkpoints.read(0).await.unwrap(), None);
}

#[tokio::test]
async fn test_recovery_store_failure_fails_transaction() {
    let config = small_config();
    let store = Arc::new(InMemory::new());
    let backend = Arc::new(ObjectStoreBackend::new(store.clone(), &config));
    let checkpoints = Arc::new(FlakyCheckpoints::default());
    let mut writer = PartitionWriter::open(1, config, backend, checkpoints.clone())
        .await
        .unwrap();

    checkpoints.fail_writes.store(true, Ordering::SeqCst);
    let err = writer.run_transaction(3, ["payload"]).await.unwrap_err();

    assert!(matches!(err, Error::RecoveryStore(_)));
    assert_eq!(writer.phase(), TransactionPhase::Failed { transaction_id: 3 });

    // The block is durable even though completion could not be confirmed.
    let id = BlockId::first(1, 3).unwrap();
    assert!(store.head(&block_path(writer.blob(), &id)).await.is_ok());
    assert_eq!(checkpoints.read(1).await.unwrap(), None);

    // Replaying once the store recovers completes the transaction.
    checkpoints.fail_writes.store(false, Ordering::SeqCst);
    let summary = writer.run_transaction(3, ["payload"]).await.unwrap();
    assert_eq!(summary.blocks, vec![id]);
    assert_eq!(writer.phase(), TransactionPhase::Idle);
}

#[tokio::test]
async fn test_failed_writer_only_accepts_replay() {
    let config = WriterConfig {
        block_capacity: 30,
        ..small_config()
    };
    let h = Harness::new(&config);
    let mut writer = h.open(0, config).await;

    writer.start(5).unwrap();
    assert!(writer.deliver(&message('z', 40)).await.is_err());

    assert!(matches!(writer.start(6), Err(Error::InvalidTransition(_))));
    assert_eq!(writer.abort(), None);
    assert_eq!(writer.phase(), TransactionPhase::Failed { transaction_id: 5 });

    writer.start(5).unwrap();
    assert_eq!(writer.phase(), TransactionPhase::Active { transaction_id: 5 });
}

// ============================================================================
// Durable stores
// ============================================================================

#[tokio::test]
async fn test_local_filesystem_and_sqlite_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let blocks_dir = dir.path().join("blocks");
    std::fs::create_dir_all(&blocks_dir).unwrap();

    let config = small_config();
    let store = Arc::new(object_store::local::LocalFileSystem::new_with_prefix(&blocks_dir).unwrap());
    let backend = Arc::new(ObjectStoreBackend::new(store, &config));
    let checkpoints = Arc::new(
        SqliteCheckpointStore::new(dir.path().join("checkpoints.db"), config.key_templates.clone())
            .await
            .unwrap(),
    );

    let mut writer = PartitionWriter::open(6, config, backend.clone(), checkpoints.clone())
        .await
        .unwrap();
    let summary = writer
        .run_transaction(21, [message('a', 50), message('b', 50), message('c', 50)])
        .await
        .unwrap();

    assert_eq!(checkpoints.read(6).await.unwrap(), summary.checkpoint);
    assert_eq!(
        backend.committed_block_list("partition-00006").await.unwrap(),
        summary.blocks
    );
}
