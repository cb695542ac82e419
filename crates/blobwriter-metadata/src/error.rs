//! Checkpoint Store Error Types
//!
//! ## Error Categories
//!
//! ### Database Errors
//! - `DatabaseError`: SQLite operation failed (connection, query, commit)
//! - `MigrationError`: Schema migration failed on open
//!
//! ### Data Errors
//! - `CorruptCheckpoint`: Only some of a partition's keys exist, or a value does not parse
//! - `Core`: Key templates or checkpoint contents violate a core invariant
//!
//! ## Usage
//!
//! All store operations return `Result<T>` which is aliased to
//! `Result<T, MetadataError>`. The storage crate wraps these into its own
//! `Error::RecoveryStore` so a failed checkpoint write fails the transaction.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Corrupt checkpoint for partition {partition}: {reason}")]
    CorruptCheckpoint { partition: u32, reason: String },

    #[error(transparent)]
    Core(#[from] blobwriter_core::Error),
}

impl From<sqlx::migrate::MigrateError> for MetadataError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        MetadataError::MigrationError(e.to_string())
    }
}
