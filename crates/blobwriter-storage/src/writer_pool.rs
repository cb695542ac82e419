//! Writer Pool - One Partition Writer Per Partition
//!
//! A process usually owns several partitions. `WriterPool` keeps one
//! `PartitionWriter` per partition, all sharing one block backend and one
//! checkpoint store.
//!
//! ## Example Usage
//!
//! ```ignore
//! use blobwriter_storage::WriterPool;
//!
//! let pool = WriterPool::new(backend, checkpoints, config);
//!
//! // Partition start: clears the checkpoint
//! pool.open_partition(2).await?;
//!
//! let summary = pool.run_transaction(2, 7, messages).await?;
//! ```
//!
//! ## Thread Safety
//!
//! - The writer map sits behind `RwLock`; lookups take the read lock
//! - Each writer is wrapped in `Arc<Mutex<PartitionWriter>>`, so one partition is
//!   driven by one task at a time while distinct partitions proceed concurrently
//! - Partitions share no mutable state apart from the backend and checkpoint
//!   store, and each only touches its own blob and keys

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use blobwriter_metadata::CheckpointStore;

use crate::backend::BlockBackend;
use crate::block_state::TransactionSummary;
use crate::config::WriterConfig;
use crate::error::{Error, Result};
use crate::writer::PartitionWriter;

type WriterMap = RwLock<HashMap<u32, Arc<Mutex<PartitionWriter>>>>;

pub struct WriterPool {
    writers: WriterMap,
    backend: Arc<dyn BlockBackend>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: WriterConfig,
}

impl WriterPool {
    pub fn new(
        backend: Arc<dyn BlockBackend>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: WriterConfig,
    ) -> Self {
        Self {
            writers: RwLock::new(HashMap::new()),
            backend,
            checkpoints,
            config,
        }
    }

    /// Start operating `partition`, or restart it if it is already open.
    ///
    /// Either way the partition gets a fresh writer and its checkpoint is
    /// cleared. A transaction active on the replaced writer is aborted first,
    /// after any call holding that writer's lock has returned. If opening the
    /// new writer fails the partition is left closed.
    pub async fn open_partition(&self, partition: u32) -> Result<Arc<Mutex<PartitionWriter>>> {
        let replaced = self.writers.write().await.remove(&partition);
        if let Some(old) = &replaced {
            if let Some(txid) = old.lock().await.abort() {
                tracing::warn!(partition, txid, "Restarted partition with an active transaction");
            }
        }

        let writer = PartitionWriter::open(
            partition,
            self.config.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.checkpoints),
        )
        .await?;
        let writer = Arc::new(Mutex::new(writer));

        self.writers
            .write()
            .await
            .insert(partition, Arc::clone(&writer));

        tracing::debug!(
            partition,
            restarted = replaced.is_some(),
            "Partition writer registered"
        );
        Ok(writer)
    }

    /// Writer of an open partition.
    pub async fn writer(&self, partition: u32) -> Option<Arc<Mutex<PartitionWriter>>> {
        self.writers.read().await.get(&partition).cloned()
    }

    /// Run one transaction on an open partition.
    pub async fn run_transaction<I, S>(
        &self,
        partition: u32,
        transaction_id: u64,
        messages: I,
    ) -> Result<TransactionSummary>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let writer = self.writer(partition).await.ok_or_else(|| {
            Error::InvalidTransition(format!("partition {} is not open", partition))
        })?;
        let mut guard = writer.lock().await;
        guard.run_transaction(transaction_id, messages).await
    }

    /// Stop operating `partition` in this process (reassignment).
    ///
    /// The checkpoint is left in place for tooling; the next owner clears it
    /// when it opens the partition.
    pub async fn release(&self, partition: u32) -> bool {
        let removed = self.writers.write().await.remove(&partition);
        if let Some(writer) = &removed {
            if let Some(txid) = writer.lock().await.abort() {
                tracing::warn!(partition, txid, "Released partition with an active transaction");
            }
        }
        removed.is_some()
    }

    /// Open partitions, ascending.
    pub async fn partitions(&self) -> Vec<u32> {
        let mut partitions: Vec<u32> = self.writers.read().await.keys().copied().collect();
        partitions.sort_unstable();
        partitions
    }

    pub async fn writer_count(&self) -> usize {
        self.writers.read().await.len()
    }
}
