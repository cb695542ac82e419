//! Blob finalization.
//!
//! Uploaded blocks are invisible until the blob's block list is committed. The
//! checkpoint names the last completed transaction's first and last block, so
//! the list of that transaction can be rebuilt without any other state:
//!
//! ```text
//! committed: [t5-s0, t5-s1, t6-s0]
//! checkpoint: t6, s0..=s2
//! new list:  [t5-s0, t5-s1, t6-s0, t6-s1, t6-s2]
//! ```
//!
//! Ids of the checkpointed transaction already present in the committed list
//! (from an earlier attempt) are replaced, never duplicated. Committing the
//! same checkpoint twice is a no-op.

use std::sync::Arc;

use blobwriter_core::{blob_name, Checkpoint};
use blobwriter_metadata::CheckpointStore;

use crate::backend::BlockBackend;
use crate::error::Result;

/// Commit the blocks named by `checkpoint` to `blob`.
///
/// Returns `false` when the committed list already matched.
pub async fn commit_transaction(
    backend: &dyn BlockBackend,
    blob: &str,
    checkpoint: &Checkpoint,
) -> Result<bool> {
    let committed = backend.committed_block_list(blob).await?;

    let mut list: Vec<_> = committed
        .iter()
        .filter(|id| id.transaction_id() != checkpoint.transaction_id)
        .copied()
        .collect();
    list.extend(checkpoint.block_ids()?);

    if list == committed {
        tracing::debug!(
            blob = %blob,
            txid = checkpoint.transaction_id,
            "Block list already committed"
        );
        return Ok(false);
    }

    backend.commit_block_list(blob, &list).await?;

    tracing::info!(
        blob = %blob,
        txid = checkpoint.transaction_id,
        blocks = checkpoint.block_count(),
        total_blocks = list.len(),
        "Block list committed"
    );
    Ok(true)
}

/// Commits a partition's checkpointed transaction to its blob, out of band of
/// the writer.
pub struct BlobFinalizer {
    backend: Arc<dyn BlockBackend>,
    checkpoints: Arc<dyn CheckpointStore>,
    blob_prefix: String,
}

impl BlobFinalizer {
    pub fn new(
        backend: Arc<dyn BlockBackend>,
        checkpoints: Arc<dyn CheckpointStore>,
        blob_prefix: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            checkpoints,
            blob_prefix: blob_prefix.into(),
        }
    }

    /// Commit the partition's checkpointed blocks.
    ///
    /// Returns the checkpoint that was applied, or `None` if the partition has
    /// no checkpoint.
    pub async fn finalize(&self, partition: u32) -> Result<Option<Checkpoint>> {
        let Some(checkpoint) = self.checkpoints.read(partition).await? else {
            tracing::info!(partition, "No checkpoint, nothing to finalize");
            return Ok(None);
        };

        let blob = blob_name(&self.blob_prefix, partition);
        commit_transaction(self.backend.as_ref(), &blob, &checkpoint).await?;
        Ok(Some(checkpoint))
    }
}
