//! Storage Error Types
//!
//! ## Error Categories
//!
//! ### Transaction-Fatal Errors
//! Each of these moves the partition writer into its failed state. The
//! upstream driver decides whether to replay the transaction.
//! - `SizingMisconfiguration`: An accepted message cannot fit an empty block
//! - `UploadFailed`: The remote store rejected a block after transport retries
//! - `CommitFailed`: The remote store rejected a block list commit
//! - `RecoveryStore`: The checkpoint could not be written (blocks are durable, but
//!   completion cannot be confirmed)
//!
//! ### Driver Errors
//! Returned without changing writer state.
//! - `InvalidTransition`: Lifecycle call out of order (e.g. `deliver` while idle)
//! - `StaleTransaction`: Transaction id lower than the last completed one
//!
//! ### Other
//! - `InvalidConfig`: Configuration rejected by validation
//! - `CorruptBlockList`: A committed block list could not be parsed
//! - `ObjectStoreError`: Low-level object store failure outside the upload path
//! - `Core`: Block id derivation failed (partition or sequence out of range)

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "Sizing misconfiguration: message of {message_len} bytes does not fit an empty block of {block_capacity} bytes"
    )]
    SizingMisconfiguration {
        message_len: usize,
        block_capacity: usize,
    },

    #[error("Block upload failed: {blob}/{block_id}: {reason}")]
    UploadFailed {
        blob: String,
        block_id: String,
        reason: String,
    },

    #[error("Block list commit failed: {blob}: {reason}")]
    CommitFailed { blob: String, reason: String },

    #[error("Recovery store error: {0}")]
    RecoveryStore(#[from] blobwriter_metadata::MetadataError),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error(
        "Stale transaction {transaction_id} for partition {partition} (last completed {last_completed})"
    )]
    StaleTransaction {
        partition: u32,
        transaction_id: u64,
        last_completed: u64,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Corrupt block list: {blob}: {reason}")]
    CorruptBlockList { blob: String, reason: String },

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error(transparent)]
    Core(#[from] blobwriter_core::Error),
}

impl Error {
    /// Short label used for the `reason` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SizingMisconfiguration { .. } => "sizing",
            Error::UploadFailed { .. } => "upload",
            Error::CommitFailed { .. } => "commit",
            Error::RecoveryStore(_) => "recovery_store",
            Error::InvalidTransition(_) => "transition",
            Error::StaleTransaction { .. } => "stale",
            Error::InvalidConfig(_) => "config",
            Error::CorruptBlockList { .. } => "block_list",
            Error::ObjectStoreError(_) => "object_store",
            Error::Core(_) => "core",
        }
    }
}
