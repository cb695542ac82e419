//! Partition Writer
//!
//! `PartitionWriter` is what the upstream batch driver talks to. It owns one
//! partition's context and at most one in-flight `BlockState`.
//!
//! ## State Machine
//!
//! ```text
//!          start(t)               finish() ok
//!   Idle ───────────► Active(t) ─────────────► Idle
//!     ▲                  │
//!     │ abort()          │ upload / sizing / commit / checkpoint error
//!     └──────────────────┤
//!                        ▼
//!                    Failed(t) ── start(t) ──► Active(t)
//! ```
//!
//! `Failed(t)` is left only by replaying the same transaction id. The replay
//! starts again from block sequence zero and, fed the same messages, uploads
//! the same block ids, overwriting whatever the failed attempt left behind.
//!
//! ## Usage
//!
//! ```ignore
//! use blobwriter_storage::{PartitionWriter, WriterConfig};
//!
//! let mut writer = PartitionWriter::open(2, config, backend, checkpoints).await?;
//!
//! writer.start(7)?;
//! writer.deliver("order-1").await?;
//! writer.deliver("order-2").await?;
//! let summary = writer.finish().await?;
//! assert_eq!(summary.messages, 2);
//! ```

use std::sync::Arc;

use blobwriter_metadata::CheckpointStore;
use blobwriter_observability::metrics;

use crate::backend::BlockBackend;
use crate::block_state::{BlockState, MessageOutcome, TransactionSummary};
use crate::config::WriterConfig;
use crate::context::PartitionContext;
use crate::error::{Error, Result};

/// Observable lifecycle phase of a partition writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Idle,
    Active { transaction_id: u64 },
    Failed { transaction_id: u64 },
}

enum Phase {
    Idle,
    Active(BlockState),
    Failed(u64),
}

pub struct PartitionWriter {
    partition: u32,
    context: Arc<PartitionContext>,
    phase: Phase,
    last_completed: Option<u64>,
}

impl PartitionWriter {
    /// Start operating `partition` in this process.
    ///
    /// Clears the partition's checkpoint, so a transaction interrupted before
    /// this point is never continued; the driver replays it from scratch.
    #[tracing::instrument(skip(config, backend, checkpoints))]
    pub async fn open(
        partition: u32,
        config: WriterConfig,
        backend: Arc<dyn BlockBackend>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        let context = Arc::new(PartitionContext::new(partition, config, backend, checkpoints)?);
        context.checkpoints().clear(partition).await?;

        tracing::info!(
            partition,
            blob = %context.blob(),
            "Partition writer opened, checkpoint cleared"
        );

        Ok(Self {
            partition,
            context,
            phase: Phase::Idle,
            last_completed: None,
        })
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    pub fn blob(&self) -> &str {
        self.context.blob()
    }

    pub fn config(&self) -> &WriterConfig {
        self.context.config()
    }

    pub fn phase(&self) -> TransactionPhase {
        match &self.phase {
            Phase::Idle => TransactionPhase::Idle,
            Phase::Active(state) => TransactionPhase::Active {
                transaction_id: state.transaction_id(),
            },
            Phase::Failed(txid) => TransactionPhase::Failed {
                transaction_id: *txid,
            },
        }
    }

    /// Id of the last transaction this writer completed successfully.
    pub fn last_completed(&self) -> Option<u64> {
        self.last_completed
    }

    /// Begin transaction `transaction_id`.
    pub fn start(&mut self, transaction_id: u64) -> Result<()> {
        match self.phase {
            Phase::Active(ref state) => {
                return Err(Error::InvalidTransition(format!(
                    "partition {} already has transaction {} active",
                    self.partition,
                    state.transaction_id()
                )));
            }
            Phase::Failed(failed) if failed != transaction_id => {
                return Err(Error::InvalidTransition(format!(
                    "partition {} failed in transaction {}; it must be replayed before starting {}",
                    self.partition, failed, transaction_id
                )));
            }
            _ => {}
        }

        if let Some(last_completed) = self.last_completed {
            if transaction_id < last_completed {
                tracing::warn!(
                    partition = self.partition,
                    txid = transaction_id,
                    last_completed,
                    "Rejecting stale transaction"
                );
                return Err(Error::StaleTransaction {
                    partition: self.partition,
                    transaction_id,
                    last_completed,
                });
            }
        }

        let replay = matches!(self.phase, Phase::Failed(_))
            || self.last_completed == Some(transaction_id);
        let state = BlockState::init(Arc::clone(&self.context), transaction_id)?;
        self.phase = Phase::Active(state);

        tracing::info!(
            partition = self.partition,
            txid = transaction_id,
            replay,
            "Transaction started"
        );
        Ok(())
    }

    /// Route one message into the active transaction.
    ///
    /// Oversize and empty messages are reported through the outcome and do not
    /// fail the transaction. Any error does, except calling this while idle.
    pub async fn deliver(&mut self, message: &str) -> Result<MessageOutcome> {
        let Phase::Active(state) = &mut self.phase else {
            return Err(self.not_active("deliver"));
        };

        match state.add_message(message).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let txid = state.transaction_id();
                self.fail(txid, &e);
                Err(e)
            }
        }
    }

    /// Complete the active transaction: flush the last block, optionally commit
    /// the blob, then persist the checkpoint if any block was uploaded.
    #[tracing::instrument(skip(self), fields(partition = self.partition))]
    pub async fn finish(&mut self) -> Result<TransactionSummary> {
        let state = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Active(state) => state,
            other => {
                self.phase = other;
                return Err(self.not_active("finish"));
            }
        };
        let txid = state.transaction_id();

        let summary = match state.complete().await {
            Ok(summary) => summary,
            Err(e) => {
                self.fail(txid, &e);
                return Err(e);
            }
        };

        self.last_completed = Some(txid);
        metrics::MESSAGES_WRITTEN_TOTAL
            .with_label_values(&[self.context.label()])
            .inc_by(summary.messages);

        tracing::info!(
            partition = self.partition,
            txid,
            messages = summary.messages,
            dropped = summary.dropped,
            blocks = summary.blocks.len(),
            "Transaction completed"
        );
        Ok(summary)
    }

    /// Discard the active transaction without writing a checkpoint.
    ///
    /// Blocks already uploaded stay in remote storage uncommitted; a later
    /// replay of the same transaction id overwrites them. Returns the id of the
    /// discarded transaction, if one was active. A failed writer stays failed.
    pub fn abort(&mut self) -> Option<u64> {
        let state = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Active(state) => state,
            other => {
                self.phase = other;
                return None;
            }
        };

        tracing::info!(
            partition = self.partition,
            txid = state.transaction_id(),
            messages = state.message_count(),
            uploaded_blocks = state.uploaded_blocks().len(),
            "Transaction aborted"
        );
        Some(state.transaction_id())
    }

    /// Run a whole transaction: `start`, `deliver` each message, `finish`.
    pub async fn run_transaction<I, S>(
        &mut self,
        transaction_id: u64,
        messages: I,
    ) -> Result<TransactionSummary>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.start(transaction_id)?;
        for message in messages {
            self.deliver(message.as_ref()).await?;
        }
        self.finish().await
    }

    fn fail(&mut self, transaction_id: u64, error: &Error) {
        self.phase = Phase::Failed(transaction_id);

        metrics::TRANSACTIONS_FAILED_TOTAL
            .with_label_values(&[self.context.label(), error.kind()])
            .inc();
        tracing::error!(
            partition = self.partition,
            txid = transaction_id,
            error = %error,
            "Transaction failed"
        );
    }

    fn not_active(&self, operation: &str) -> Error {
        let phase = match self.phase {
            Phase::Idle => "idle".to_string(),
            Phase::Failed(txid) => format!("failed in transaction {}", txid),
            Phase::Active(_) => "active".to_string(),
        };
        Error::InvalidTransition(format!(
            "{} on partition {} while {}",
            operation, self.partition, phase
        ))
    }
}
