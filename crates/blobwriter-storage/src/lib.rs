//! Blobwriter Storage Layer
//!
//! This crate implements the write path: it turns a per-partition stream of
//! text messages, grouped into transactions by an upstream batch driver, into
//! immutable blocks of one block blob per partition.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐
//! │  Batch driver    │  start(txid) / deliver(msg) / finish()
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐        ┌───────────────────┐
//! │ PartitionWriter  │───────►│  CheckpointStore  │  clear on open,
//! │  Idle/Active/    │        │  (blobwriter-     │  write on finish
//! │  Failed          │        │   metadata)       │
//! └────────┬─────────┘        └───────────────────┘
//!          ▼
//! ┌──────────────────┐
//! │   BlockState     │  one per transaction, packs messages greedily
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Block        │  in-memory buffer, uploaded once
//! └────────┬─────────┘
//!          ▼ put_block / commit_block_list
//! ┌──────────────────┐
//! │  BlockBackend    │  ObjectStoreBackend: S3, local, in-memory
//! └──────────────────┘
//! ```
//!
//! ## Recovery Model
//!
//! Block ids are derived from `(partition, transaction id, sequence)`. When a
//! transaction fails, or the process dies mid-transaction, the driver replays
//! the same transaction id with the same messages. The replay uploads the
//! same ids, so the remote store ends in the same state as a clean run.
//! The checkpoint records which blocks the last completed transaction produced,
//! which is everything [`BlobFinalizer`] needs to commit them.
//!
//! ## Main Components
//!
//! - [`PartitionWriter`]: lifecycle state machine for one partition
//! - [`BlockState`]: block chain of one transaction
//! - [`Block`]: one buffered block
//! - [`BlockBackend`] / [`ObjectStoreBackend`]: remote block storage
//! - [`BlobFinalizer`]: commits checkpointed blocks to the blob
//! - [`WriterPool`]: many partitions in one process

pub mod backend;
pub mod block;
pub mod block_state;
pub mod config;
pub mod context;
pub mod error;
pub mod finalize;
pub mod writer;
pub mod writer_pool;

pub use backend::{block_list_path, block_path, BlockBackend, ObjectStoreBackend};
pub use block::Block;
pub use block_state::{BlockState, MessageOutcome, TransactionSummary};
pub use config::{WriterConfig, REMOTE_BLOCK_SIZE_LIMIT};
pub use context::PartitionContext;
pub use error::{Error, Result};
pub use finalize::{commit_transaction, BlobFinalizer};
pub use writer::{PartitionWriter, TransactionPhase};
pub use writer_pool::WriterPool;
