//! Block chain of a single transaction.
//!
//! `BlockState` owns the ordered chain of blocks produced for one
//! `(partition, transaction)` pair. Messages are packed greedily: the current
//! block is rolled over only when the next message does not fit.
//!
//! ## Write Flow
//!
//! ```text
//! add_message(msg)
//!     ↓
//! empty?                  → skipped, not counted
//!     ↓
//! framed > max size?      → dropped, counted as dropped
//!     ↓
//! framed > capacity?      → SizingMisconfiguration (fatal)
//!     ↓
//! fits current block?     → append
//!     ↓ NO
//! upload current block    ← need_persist = true
//!     ↓
//! next block (sequence + 1) → append
//! ```
//!
//! ## Replay Safety
//!
//! Block ids are `f(partition, transaction_id, sequence)` and sequence only
//! advances on rollover, which depends only on message sizes. Replaying the same
//! messages for the same transaction id therefore produces the same ids, and the
//! re-uploaded blocks overwrite the earlier attempt's copies.

use std::sync::Arc;
use std::time::Instant;

use blobwriter_core::{BlockId, Checkpoint};
use blobwriter_observability::metrics;
use serde::Serialize;

use crate::block::Block;
use crate::context::PartitionContext;
use crate::error::{Error, Result};
use crate::finalize::commit_transaction;

/// What happened to one delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Appended to `block`; `rolled_over` if the previous block was uploaded first.
    Accepted { block: BlockId, rolled_over: bool },
    /// Null or empty message, ignored.
    Empty,
    /// Framed size exceeded the configured maximum.
    Dropped { framed_len: usize },
}

/// Result of a completed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    pub partition: u32,
    pub transaction_id: u64,
    /// Messages accepted into blocks; the transaction's emitted result.
    pub messages: u64,
    /// Oversize messages dropped.
    pub dropped: u64,
    /// Ids of every block uploaded, in order.
    pub blocks: Vec<BlockId>,
    /// Checkpoint persisted on completion, if any block was uploaded.
    pub checkpoint: Option<Checkpoint>,
}

pub struct BlockState {
    context: Arc<PartitionContext>,
    transaction_id: u64,
    current: Block,
    uploaded: Vec<BlockId>,
    need_persist: bool,
    messages: u64,
    dropped: u64,
}

impl BlockState {
    /// Start a transaction at block sequence zero.
    pub fn init(context: Arc<PartitionContext>, transaction_id: u64) -> Result<Self> {
        let first = BlockId::first(context.partition(), transaction_id)?;
        let current = Block::new(first, context.blob(), context.config().block_capacity);

        Ok(Self {
            context,
            transaction_id,
            current,
            uploaded: Vec::new(),
            need_persist: false,
            messages: 0,
            dropped: 0,
        })
    }

    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    pub fn message_count(&self) -> u64 {
        self.messages
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    pub fn need_persist(&self) -> bool {
        self.need_persist
    }

    /// Block currently being filled.
    pub fn current_block(&self) -> &Block {
        &self.current
    }

    /// Blocks uploaded so far, in order.
    pub fn uploaded_blocks(&self) -> &[BlockId] {
        &self.uploaded
    }

    /// Apply one message. See the module docs for the decision sequence.
    pub async fn add_message(&mut self, message: &str) -> Result<MessageOutcome> {
        let config = self.context.config();

        if message.is_empty() {
            return Ok(MessageOutcome::Empty);
        }

        let framed_len = config.framed_len(message);

        if framed_len > config.max_message_size {
            self.dropped += 1;
            metrics::MESSAGES_DROPPED_TOTAL
                .with_label_values(&[self.context.label()])
                .inc();
            tracing::warn!(
                partition = self.context.partition(),
                txid = self.transaction_id,
                framed_len,
                max_message_size = config.max_message_size,
                "Message skipped: size exceeds the limit"
            );
            return Ok(MessageOutcome::Dropped { framed_len });
        }

        if framed_len > config.block_capacity {
            return Err(Error::SizingMisconfiguration {
                message_len: framed_len,
                block_capacity: config.block_capacity,
            });
        }

        let mut rolled_over = false;
        if !self.current.fits(framed_len) {
            self.roll_over().await?;
            rolled_over = true;
        }

        self.current.append(message.as_bytes());
        self.current
            .append(self.context.config().message_delimiter.as_bytes());
        self.messages += 1;

        tracing::trace!(
            partition = self.context.partition(),
            txid = self.transaction_id,
            block_id = %self.current.id(),
            framed_len,
            "Message appended"
        );

        Ok(MessageOutcome::Accepted {
            block: *self.current.id(),
            rolled_over,
        })
    }

    /// Flush the current block and persist the checkpoint if anything was
    /// uploaded during this transaction.
    ///
    /// With `commit_on_complete` the block list is committed before the
    /// checkpoint is written, so a failed commit leaves no checkpoint behind.
    pub async fn complete(mut self) -> Result<TransactionSummary> {
        if !self.current.is_empty() {
            self.upload_current().await?;
        }

        let checkpoint = if self.need_persist {
            let first = BlockId::first(self.context.partition(), self.transaction_id)?;
            let checkpoint = Checkpoint::new(self.transaction_id, first, *self.current.id())?;
            if self.context.config().commit_on_complete {
                commit_transaction(self.context.backend(), self.context.blob(), &checkpoint)
                    .await?;
            }
            self.context.checkpoints().write(&checkpoint).await?;

            metrics::CHECKPOINTS_WRITTEN_TOTAL
                .with_label_values(&[self.context.label()])
                .inc();
            tracing::info!(
                partition = self.context.partition(),
                txid = self.transaction_id,
                first_block = %checkpoint.first_block,
                last_block = %checkpoint.last_block,
                "Checkpoint persisted"
            );
            Some(checkpoint)
        } else {
            None
        };

        Ok(TransactionSummary {
            partition: self.context.partition(),
            transaction_id: self.transaction_id,
            messages: self.messages,
            dropped: self.dropped,
            blocks: self.uploaded,
            checkpoint,
        })
    }

    async fn roll_over(&mut self) -> Result<()> {
        let from = *self.current.id();
        self.upload_current().await?;

        let next = from.next()?;
        self.current = Block::new(next, self.context.blob(), self.context.config().block_capacity);

        tracing::debug!(
            partition = self.context.partition(),
            txid = self.transaction_id,
            blob = %self.context.blob(),
            from = %from,
            to = %next,
            "Rolled over to next block"
        );
        Ok(())
    }

    async fn upload_current(&mut self) -> Result<()> {
        let start = Instant::now();
        let len = self.current.upload(self.context.backend()).await?;
        self.need_persist = true;
        self.uploaded.push(*self.current.id());

        let label = self.context.label();
        metrics::BLOCKS_UPLOADED_TOTAL.with_label_values(&[label]).inc();
        metrics::BLOCK_BYTES_TOTAL
            .with_label_values(&[label])
            .inc_by(len as u64);
        metrics::BLOCK_UPLOAD_LATENCY
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());

        tracing::debug!(
            partition = self.context.partition(),
            txid = self.transaction_id,
            block_id = %self.current.id(),
            size = len,
            "Block uploaded"
        );
        Ok(())
    }
}
