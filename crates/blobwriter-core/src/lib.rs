//! Blobwriter Core Types
//!
//! Shared, storage-agnostic building blocks used by every other blobwriter crate:
//!
//! - [`BlockId`]: the deterministic identity of one remote block
//! - [`Checkpoint`]: the recovery record persisted per partition
//! - [`KeyTemplates`] / [`PartitionKeys`]: naming of recovery-store keys
//! - [`blob_name`]: naming of the remote blob a partition appends to
//!
//! Nothing in this crate performs I/O.

pub mod block_id;
pub mod checkpoint;
pub mod error;
pub mod keys;

pub use block_id::{blob_name, BlockId, MAX_PARTITION, MAX_SEQUENCE};
pub use checkpoint::Checkpoint;
pub use error::{Error, Result};
pub use keys::{KeyTemplates, PartitionKeys, PARTITION_PLACEHOLDER};
