//! Partition Checkpoint Record
//!
//! The durable recovery record of one partition: the most recent transaction
//! that completed with at least one uploaded block, and the first and last
//! block ids it produced. Because block ids are derived, the full ordered block
//! list of that transaction is recoverable from the two ends alone.

use serde::{Deserialize, Serialize};

use crate::block_id::BlockId;
use crate::error::{Error, Result};

/// Deserialization goes through [`Checkpoint::new`], so a decoded record is
/// as consistent as a constructed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCheckpoint")]
pub struct Checkpoint {
    pub transaction_id: u64,
    pub first_block: BlockId,
    pub last_block: BlockId,
}

#[derive(Deserialize)]
struct RawCheckpoint {
    transaction_id: u64,
    first_block: BlockId,
    last_block: BlockId,
}

impl TryFrom<RawCheckpoint> for Checkpoint {
    type Error = Error;

    fn try_from(raw: RawCheckpoint) -> Result<Self> {
        Checkpoint::new(raw.transaction_id, raw.first_block, raw.last_block)
    }
}

impl Checkpoint {
    /// Build a checkpoint, checking both block ids belong to `transaction_id`
    /// and to the same partition, with `first_block <= last_block`.
    pub fn new(transaction_id: u64, first_block: BlockId, last_block: BlockId) -> Result<Self> {
        if first_block.transaction_id() != transaction_id
            || last_block.transaction_id() != transaction_id
        {
            return Err(Error::InconsistentCheckpoint(format!(
                "blocks {} / {} do not belong to transaction {}",
                first_block, last_block, transaction_id
            )));
        }
        // Validates partition equality and ordering.
        first_block.range_inclusive(&last_block)?;

        Ok(Self {
            transaction_id,
            first_block,
            last_block,
        })
    }

    pub fn partition(&self) -> u32 {
        self.first_block.partition()
    }

    /// Ordered ids of every block the checkpointed transaction uploaded.
    pub fn block_ids(&self) -> Result<Vec<BlockId>> {
        self.first_block.range_inclusive(&self.last_block)
    }

    pub fn block_count(&self) -> u32 {
        self.last_block
            .sequence()
            .saturating_sub(self.first_block.sequence())
            + 1
    }
}
