//! Error Types for Blobwriter Core
//!
//! ## Error Categories
//!
//! ### Identity Errors
//! - `InvalidBlockId`: A block id string does not follow the fixed layout
//! - `SequenceOverflow`: A transaction produced more blocks than the id layout can encode
//! - `PartitionOutOfRange`: Partition index does not fit the fixed-width encoding
//!
//! ### Naming Errors
//! - `InvalidKeyTemplate`: A recovery-store key template is malformed
//!
//! ### Recovery Errors
//! - `InconsistentCheckpoint`: First/last block ids disagree with each other or the transaction

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid block id: {0}")]
    InvalidBlockId(String),

    #[error("Block sequence overflow for partition {partition}, transaction {transaction_id}")]
    SequenceOverflow { partition: u32, transaction_id: u64 },

    #[error("Partition index out of range: {0}")]
    PartitionOutOfRange(u32),

    #[error("Invalid key template: {0}")]
    InvalidKeyTemplate(String),

    #[error("Inconsistent checkpoint: {0}")]
    InconsistentCheckpoint(String),
}

pub type Result<T> = std::result::Result<T, Error>;
