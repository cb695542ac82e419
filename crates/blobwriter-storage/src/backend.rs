//! Remote Block Storage
//!
//! The partition writer talks to remote storage only through [`BlockBackend`]:
//!
//! - `put_block(blob, block_id, bytes)`: store one block; overwriting a block
//!   with the same id replaces it
//! - `commit_block_list(blob, ids)`: make the blob consist of exactly `ids`, in order
//! - `committed_block_list(blob)`: the list from the last successful commit
//!
//! Retry policy belongs here, at the transport boundary. The writer core
//! performs exactly one `put_block` call per block and treats an error as final
//! for the transaction.
//!
//! ## ObjectStoreBackend
//!
//! Emulates block blobs on any `object_store::ObjectStore` (S3, GCS, Azure,
//! local filesystem, in-memory):
//!
//! ```text
//! {blob}/blocks/{block_id}   one object per uploaded block
//! {blob}/blocklist           committed ids, one per line
//! ```
//!
//! Because block ids are deterministic, a replayed upload writes the same key
//! again rather than adding a new object.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use blobwriter_core::BlockId;
use bytes::Bytes;
use object_store::{path::Path, ObjectStore};

use crate::config::WriterConfig;
use crate::error::{Error, Result};

#[async_trait]
pub trait BlockBackend: Send + Sync {
    /// Upload one block. Must not return until the block is durable.
    async fn put_block(&self, blob: &str, block_id: &BlockId, data: Bytes) -> Result<()>;

    /// Replace the blob's committed block list with `block_ids`.
    ///
    /// Every id must refer to a previously uploaded block.
    async fn commit_block_list(&self, blob: &str, block_ids: &[BlockId]) -> Result<()>;

    /// The blob's committed block list, empty if nothing was committed yet.
    async fn committed_block_list(&self, blob: &str) -> Result<Vec<BlockId>>;
}

/// Object key of one block.
pub fn block_path(blob: &str, block_id: &BlockId) -> Path {
    Path::from(format!("{}/blocks/{}", blob, block_id))
}

/// Object key of a blob's committed block list.
pub fn block_list_path(blob: &str) -> Path {
    Path::from(format!("{}/blocklist", blob))
}

/// Upper bound on a single retry delay.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// [`BlockBackend`] over an `object_store::ObjectStore`.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    upload_retries: u32,
    retry_backoff: Duration,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, config: &WriterConfig) -> Self {
        Self {
            store,
            upload_retries: config.upload_retries.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Delay before retry `attempt + 1`, doubling per attempt up to
    /// [`MAX_RETRY_BACKOFF`].
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(MAX_RETRY_BACKOFF)
    }

    /// PUT with exponential backoff. Returns the last error once all attempts
    /// are used up.
    async fn put_with_retry(&self, path: &Path, data: Bytes) -> std::result::Result<(), object_store::Error> {
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            match self.store.put(path, data.clone()).await {
                Ok(_) => {
                    tracing::debug!(
                        path = %path,
                        size = data.len(),
                        attempt = attempt + 1,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Object stored"
                    );
                    return Ok(());
                }
                Err(e) if attempt + 1 < self.upload_retries => {
                    let backoff = self.backoff(attempt);
                    tracing::warn!(
                        path = %path,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Object store PUT failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        path = %path,
                        attempts = attempt + 1,
                        error = %e,
                        "Object store PUT failed after all retries"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl BlockBackend for ObjectStoreBackend {
    async fn put_block(&self, blob: &str, block_id: &BlockId, data: Bytes) -> Result<()> {
        let path = block_path(blob, block_id);
        self.put_with_retry(&path, data)
            .await
            .map_err(|e| Error::UploadFailed {
                blob: blob.to_string(),
                block_id: block_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn commit_block_list(&self, blob: &str, block_ids: &[BlockId]) -> Result<()> {
        for id in block_ids {
            match self.store.head(&block_path(blob, id)).await {
                Ok(_) => {}
                Err(object_store::Error::NotFound { .. }) => {
                    return Err(Error::CommitFailed {
                        blob: blob.to_string(),
                        reason: format!("block {} was never uploaded", id),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut body = String::with_capacity(block_ids.len() * 37);
        for id in block_ids {
            body.push_str(&id.to_string());
            body.push('\n');
        }

        self.put_with_retry(&block_list_path(blob), Bytes::from(body))
            .await
            .map_err(|e| Error::CommitFailed {
                blob: blob.to_string(),
                reason: e.to_string(),
            })
    }

    async fn committed_block_list(&self, blob: &str) -> Result<Vec<BlockId>> {
        let data = match self.store.get(&block_list_path(blob)).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let text = std::str::from_utf8(&data).map_err(|e| Error::CorruptBlockList {
            blob: blob.to_string(),
            reason: e.to_string(),
        })?;

        text.lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<BlockId>().map_err(|e| Error::CorruptBlockList {
                    blob: blob.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn backend() -> (Arc<InMemory>, ObjectStoreBackend) {
        let store = Arc::new(InMemory::new());
        let config = WriterConfig {
            retry_backoff_ms: 1,
            ..Default::default()
        };
        (store.clone(), ObjectStoreBackend::new(store, &config))
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let config = WriterConfig {
            retry_backoff_ms: 100,
            upload_retries: 64,
            ..Default::default()
        };
        let backend = ObjectStoreBackend::new(Arc::new(InMemory::new()), &config);

        assert_eq!(backend.backoff(0), Duration::from_millis(100));
        assert_eq!(backend.backoff(3), Duration::from_millis(800));
        assert_eq!(backend.backoff(40), MAX_RETRY_BACKOFF);
        assert_eq!(backend.backoff(u32::MAX), MAX_RETRY_BACKOFF);
    }

    #[tokio::test]
    async fn test_put_block_overwrites_same_id() {
        let (store, backend) = backend();
        let id = BlockId::first(0, 1).unwrap();

        backend
            .put_block("partition-00000", &id, Bytes::from("first"))
            .await
            .unwrap();
        backend
            .put_block("partition-00000", &id, Bytes::from("second"))
            .await
            .unwrap();

        let data = store
            .get(&block_path("partition-00000", &id))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(data, Bytes::from("second"));
    }

    #[tokio::test]
    async fn test_commit_and_read_block_list() {
        let (_store, backend) = backend();
        let first = BlockId::first(3, 9).unwrap();
        let second = first.next().unwrap();

        assert!(backend
            .committed_block_list("partition-00003")
            .await
            .unwrap()
            .is_empty());

        for id in [&first, &second] {
            backend
                .put_block("partition-00003", id, Bytes::from("x"))
                .await
                .unwrap();
        }
        backend
            .commit_block_list("partition-00003", &[first, second])
            .await
            .unwrap();

        assert_eq!(
            backend.committed_block_list("partition-00003").await.unwrap(),
            vec![first, second]
        );
    }

    #[tokio::test]
    async fn test_commit_rejects_missing_block() {
        let (_store, backend) = backend();
        let id = BlockId::first(1, 1).unwrap();

        let err = backend
            .commit_block_list("partition-00001", &[id])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommitFailed { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_block_list_detected() {
        let (store, backend) = backend();
        store
            .put(&block_list_path("partition-00000"), Bytes::from("not-an-id\n"))
            .await
            .unwrap();

        assert!(matches!(
            backend.committed_block_list("partition-00000").await,
            Err(Error::CorruptBlockList { .. })
        ));
    }
}
