//! Blobwriter Checkpoint Store
//!
//! This crate implements the durable recovery record kept for every partition:
//!
//! ```text
//! partition_00002_transactionid → 7
//! partition_00002_firstblock    → p00002-t00000000000000000007-s000000
//! partition_00002_lastblock     → p00002-t00000000000000000007-s000003
//! ```
//!
//! ## Lifecycle
//!
//! - **clear**: called once when a partition starts operating in a process
//!   (startup or reassignment). A transaction interrupted by a crash is never
//!   resumed; the upstream driver replays it from block sequence zero and the
//!   deterministic block ids make the replay overwrite-compatible.
//! - **write**: called when a transaction completes having uploaded at least
//!   one block. Upsert, last writer wins. Must succeed before the transaction
//!   is acknowledged.
//! - **read**: diagnostics and blob finalization.
//!
//! ## Implementations
//!
//! - [`SqliteCheckpointStore`]: file-backed (or in-memory) SQLite via SQLx
//! - [`InMemoryCheckpointStore`]: process-local map, for tests and single-process use
//!
//! Both store the three keys as independent key/value entries so the layout
//! seen by operational tooling is the same regardless of backend.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{MetadataError, Result};
pub use memory::InMemoryCheckpointStore;
pub use store::SqliteCheckpointStore;

use async_trait::async_trait;
use blobwriter_core::{BlockId, Checkpoint};

/// Durable per-partition recovery record.
///
/// Implementations must be Send + Sync; writers for different partitions share
/// one store via `Arc<dyn CheckpointStore>` and only ever touch their own keys.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Remove any checkpoint held for `partition`. Idempotent.
    async fn clear(&self, partition: u32) -> Result<()>;

    /// Replace the checkpoint for `checkpoint.partition()`.
    ///
    /// All three keys are written together; a reader never observes a mix of
    /// an old and a new checkpoint.
    async fn write(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Read the checkpoint of `partition`, if one exists.
    async fn read(&self, partition: u32) -> Result<Option<Checkpoint>>;
}

/// Values of a partition's three keys as stored.
pub(crate) struct RawEntries {
    pub transaction_id: Option<String>,
    pub first_block: Option<String>,
    pub last_block: Option<String>,
}

impl RawEntries {
    pub(crate) fn encode(checkpoint: &Checkpoint) -> [String; 3] {
        [
            checkpoint.transaction_id.to_string(),
            checkpoint.first_block.to_string(),
            checkpoint.last_block.to_string(),
        ]
    }

    /// Decode stored values. No keys at all means no checkpoint; some but not
    /// all keys means the record is corrupt.
    pub(crate) fn decode(self, partition: u32) -> Result<Option<Checkpoint>> {
        let corrupt = |reason: String| MetadataError::CorruptCheckpoint { partition, reason };

        match (self.transaction_id, self.first_block, self.last_block) {
            (None, None, None) => Ok(None),
            (Some(txid), Some(first), Some(last)) => {
                let transaction_id = txid
                    .parse::<u64>()
                    .map_err(|e| corrupt(format!("transaction id {:?}: {}", txid, e)))?;
                let first: BlockId = first.parse()?;
                let last: BlockId = last.parse()?;

                if first.partition() != partition {
                    return Err(corrupt(format!(
                        "first block {} belongs to partition {}",
                        first,
                        first.partition()
                    )));
                }

                Ok(Some(Checkpoint::new(transaction_id, first, last)?))
            }
            _ => Err(corrupt("checkpoint keys are only partially present".to_string())),
        }
    }
}
