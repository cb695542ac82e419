//! SQLite Checkpoint Store
//!
//! Implements [`CheckpointStore`] on top of SQLite through SQLx.
//!
//! ## Schema
//!
//! A single key/value table (`checkpoint_entries`) created by the embedded
//! migrations. Each partition occupies three rows named by the configured key
//! templates.
//!
//! ## Usage
//!
//! ```ignore
//! use blobwriter_metadata::{CheckpointStore, SqliteCheckpointStore};
//! use blobwriter_core::KeyTemplates;
//!
//! let store = SqliteCheckpointStore::new("checkpoints.db", KeyTemplates::default()).await?;
//! store.clear(0).await?;
//! ```
//!
//! ## Atomicity
//!
//! `write` and `clear` touch all three rows inside one SQL transaction, so a
//! crash mid-write leaves either the old or the new checkpoint, never a mix.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use blobwriter_core::{Checkpoint, KeyTemplates};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::{error::Result, CheckpointStore, RawEntries};

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
    templates: KeyTemplates,
}

impl SqliteCheckpointStore {
    /// Open (or create) a file-backed store and run migrations.
    pub async fn new<P: AsRef<Path>>(path: P, templates: KeyTemplates) -> Result<Self> {
        templates.validate()?;

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(path = %path.as_ref().display(), "Checkpoint store opened");

        Ok(Self { pool, templates })
    }

    /// Create an in-memory store (for testing).
    ///
    /// Every SQLite in-memory connection is its own database, so the pool is
    /// limited to a single connection.
    pub async fn new_in_memory(templates: KeyTemplates) -> Result<Self> {
        templates.validate()?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool, templates })
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM checkpoint_entries WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn clear(&self, partition: u32) -> Result<()> {
        let keys = self.templates.render(partition);
        let mut tx = self.pool.begin().await?;

        for key in keys.all() {
            sqlx::query("DELETE FROM checkpoint_entries WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        let keys = self.templates.render(checkpoint.partition());
        let values = RawEntries::encode(checkpoint);
        let now = Self::now_ms();

        let mut tx = self.pool.begin().await?;

        for (key, value) in keys.all().into_iter().zip(values.iter()) {
            sqlx::query(
                r#"
                INSERT INTO checkpoint_entries (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn read(&self, partition: u32) -> Result<Option<Checkpoint>> {
        let keys = self.templates.render(partition);

        RawEntries {
            transaction_id: self.get(&keys.transaction_id).await?,
            first_block: self.get(&keys.first_block).await?,
            last_block: self.get(&keys.last_block).await?,
        }
        .decode(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobwriter_core::BlockId;

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = SqliteCheckpointStore::new_in_memory(KeyTemplates::default())
            .await
            .unwrap();

        let first = BlockId::first(3, 11).unwrap();
        let last = BlockId::new(3, 11, 1).unwrap();
        let cp = Checkpoint::new(11, first, last).unwrap();

        store.write(&cp).await.unwrap();
        assert_eq!(store.read(3).await.unwrap(), Some(cp));

        store.clear(3).await.unwrap();
        assert_eq!(store.read(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rows_are_named_by_templates() {
        let store = SqliteCheckpointStore::new_in_memory(KeyTemplates::default())
            .await
            .unwrap();

        let only = BlockId::first(9, 1).unwrap();
        store
            .write(&Checkpoint::new(1, only, only).unwrap())
            .await
            .unwrap();

        assert_eq!(
            store.get("partition_00009_transactionid").await.unwrap(),
            Some("1".to_string())
        );
    }
}
