//! Per-partition context.
//!
//! Everything a partition's write path needs, bundled once when the partition
//! is opened and then shared by reference with each transaction's
//! `BlockState`. Several partitions in one process each hold their own
//! context, so there is no process-wide "current partition".

use std::sync::Arc;

use blobwriter_core::{blob_name, Error as CoreError, MAX_PARTITION};
use blobwriter_metadata::CheckpointStore;

use crate::backend::BlockBackend;
use crate::config::WriterConfig;
use crate::error::Result;

pub struct PartitionContext {
    partition: u32,
    partition_label: String,
    blob: String,
    config: WriterConfig,
    backend: Arc<dyn BlockBackend>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl PartitionContext {
    pub fn new(
        partition: u32,
        config: WriterConfig,
        backend: Arc<dyn BlockBackend>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        if partition > MAX_PARTITION {
            return Err(CoreError::PartitionOutOfRange(partition).into());
        }

        Ok(Self {
            partition,
            partition_label: partition.to_string(),
            blob: blob_name(&config.blob_prefix, partition),
            config,
            backend,
            checkpoints,
        })
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    /// Partition index as a metric label value.
    pub fn label(&self) -> &str {
        &self.partition_label
    }

    pub fn blob(&self) -> &str {
        &self.blob
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn BlockBackend {
        self.backend.as_ref()
    }

    pub fn checkpoints(&self) -> &dyn CheckpointStore {
        self.checkpoints.as_ref()
    }
}
