//! Deterministic Block Identity
//!
//! Every block a partition writer uploads is named by a pure function of
//! `(partition, transaction_id, sequence)`. A replayed transaction therefore
//! re-derives exactly the ids of the attempt it replaces, and re-uploading a
//! block overwrites the earlier copy instead of adding a duplicate.
//!
//! ## Layout
//!
//! ```text
//! p00002-t00000000000000000007-s000000
//! │      │                     └─ sequence within the transaction (6 digits)
//! │      └─ transaction id (20 digits, full u64 range)
//! └─ partition index (5 digits)
//! ```
//!
//! All ids have the same length (36 ASCII bytes). Remote block stores that
//! require equal-length ids within one blob (Azure block blobs do) accept them
//! as-is, and lexical order equals numeric order within a partition.
//!
//! The partition is part of the id even though each partition owns its own
//! blob, so ids stay unique if blobs are ever placed in a shared namespace.
//!
//! This layout is part of the on-storage recovery contract: existing
//! checkpoints and committed block lists are parsed with it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Highest partition index representable in a block id.
pub const MAX_PARTITION: u32 = 99_999;

/// Highest block sequence number a single transaction may reach.
pub const MAX_SEQUENCE: u32 = 999_999;

const ENCODED_LEN: usize = 36;

/// Identity of one block within a partition's blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockId {
    partition: u32,
    transaction_id: u64,
    sequence: u32,
}

impl BlockId {
    /// Derive the id for `sequence` within `(partition, transaction_id)`.
    pub fn new(partition: u32, transaction_id: u64, sequence: u32) -> Result<Self> {
        if partition > MAX_PARTITION {
            return Err(Error::PartitionOutOfRange(partition));
        }
        if sequence > MAX_SEQUENCE {
            return Err(Error::SequenceOverflow {
                partition,
                transaction_id,
            });
        }
        Ok(Self {
            partition,
            transaction_id,
            sequence,
        })
    }

    /// The id of the first block of a transaction.
    pub fn first(partition: u32, transaction_id: u64) -> Result<Self> {
        Self::new(partition, transaction_id, 0)
    }

    /// The id that follows this one within the same transaction.
    pub fn next(&self) -> Result<Self> {
        Self::new(self.partition, self.transaction_id, self.sequence + 1)
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Every id from `self` up to and including `last`, in order.
    ///
    /// Both ends must belong to the same partition and transaction.
    pub fn range_inclusive(&self, last: &BlockId) -> Result<Vec<BlockId>> {
        if self.partition != last.partition || self.transaction_id != last.transaction_id {
            return Err(Error::InconsistentCheckpoint(format!(
                "block range {} ..= {} spans transactions",
                self, last
            )));
        }
        if self.sequence > last.sequence {
            return Err(Error::InconsistentCheckpoint(format!(
                "block range {} ..= {} is reversed",
                self, last
            )));
        }
        (self.sequence..=last.sequence)
            .map(|seq| BlockId::new(self.partition, self.transaction_id, seq))
            .collect()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p{:05}-t{:020}-s{:06}",
            self.partition, self.transaction_id, self.sequence
        )
    }
}

impl FromStr for BlockId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidBlockId(s.to_string());

        if s.len() != ENCODED_LEN || !s.is_ascii() {
            return Err(invalid());
        }

        let mut parts = s.split('-');
        let (Some(p), Some(t), Some(q), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let partition = field(p, 'p', 5).ok_or_else(invalid)?;
        let transaction_id = field(t, 't', 20).ok_or_else(invalid)?;
        let sequence = field(q, 's', 6).ok_or_else(invalid)?;

        let partition = u32::try_from(partition).map_err(|_| invalid())?;
        let sequence = u32::try_from(sequence).map_err(|_| invalid())?;

        BlockId::new(partition, transaction_id, sequence)
    }
}

/// Parse `<tag><digits>` where digits has exactly `width` characters.
fn field(raw: &str, tag: char, width: usize) -> Option<u64> {
    let digits = raw.strip_prefix(tag)?;
    if digits.len() != width || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl TryFrom<String> for BlockId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BlockId> for String {
    fn from(id: BlockId) -> Self {
        id.to_string()
    }
}

/// Name of the remote blob that holds a partition's blocks.
pub fn blob_name(prefix: &str, partition: u32) -> String {
    format!("{}-{:05}", prefix, partition)
}
