//! Writer Configuration
//!
//! This module defines configuration for the block write path.
//!
//! ## WriterConfig
//!
//! - **max_message_size**: Framed messages larger than this are dropped (default: 256KB)
//! - **block_capacity**: Bytes packed into one block before rollover (default: 4MB - 64KB)
//! - **message_delimiter**: Appended to every accepted message (default: `"\r\n"`)
//! - **blob_prefix**: Blob name is `{blob_prefix}-{partition:05}` (default: `partition`)
//! - **upload_retries**: Transport-level attempts per block upload (default: 3)
//! - **retry_backoff_ms**: Base of the exponential backoff between attempts (default: 100ms)
//! - **commit_on_complete**: Commit the block list before each checkpoint is written (default: true)
//! - **key_templates**: Recovery-store key names
//!
//! ## Usage
//!
//! ```ignore
//! use blobwriter_storage::WriterConfig;
//!
//! let config = WriterConfig {
//!     block_capacity: 1024 * 1024,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```
//!
//! Validation is applied when configuration is loaded. The writer does not
//! re-validate; a block capacity smaller than an accepted message still
//! surfaces at runtime as `Error::SizingMisconfiguration`.

use blobwriter_core::KeyTemplates;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest block the remote block store accepts. Block capacity must stay
/// strictly below it.
pub const REMOTE_BLOCK_SIZE_LIMIT: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Maximum framed message size in bytes (default: 256KB)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Block capacity in bytes (default: 4MB - 64KB)
    #[serde(default = "default_block_capacity")]
    pub block_capacity: usize,

    /// Delimiter appended to every accepted message
    #[serde(default = "default_message_delimiter")]
    pub message_delimiter: String,

    /// Prefix of the per-partition blob name
    #[serde(default = "default_blob_prefix")]
    pub blob_prefix: String,

    /// Attempts per block upload, including the first (default: 3)
    #[serde(default = "default_upload_retries")]
    pub upload_retries: u32,

    /// Base backoff between upload attempts in milliseconds (default: 100)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Commit the transaction's blocks to the blob after its checkpoint is written
    #[serde(default = "default_commit_on_complete")]
    pub commit_on_complete: bool,

    /// Recovery-store key naming
    #[serde(default)]
    pub key_templates: KeyTemplates,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            block_capacity: default_block_capacity(),
            message_delimiter: default_message_delimiter(),
            blob_prefix: default_blob_prefix(),
            upload_retries: default_upload_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            commit_on_complete: default_commit_on_complete(),
            key_templates: KeyTemplates::default(),
        }
    }
}

fn default_max_message_size() -> usize {
    256 * 1024 // 256KB
}

fn default_block_capacity() -> usize {
    REMOTE_BLOCK_SIZE_LIMIT - 64 * 1024
}

fn default_message_delimiter() -> String {
    "\r\n".to_string()
}

fn default_blob_prefix() -> String {
    "partition".to_string()
}

fn default_upload_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_commit_on_complete() -> bool {
    true
}

impl WriterConfig {
    /// Reject configurations that can never work.
    pub fn validate(&self) -> Result<()> {
        if self.block_capacity == 0 {
            return Err(Error::InvalidConfig(
                "block_capacity must be greater than zero".to_string(),
            ));
        }
        if self.block_capacity >= REMOTE_BLOCK_SIZE_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "block_capacity {} must be below the remote block size limit {}",
                self.block_capacity, REMOTE_BLOCK_SIZE_LIMIT
            )));
        }
        if self.max_message_size > self.block_capacity {
            return Err(Error::InvalidConfig(format!(
                "max_message_size {} exceeds block_capacity {}",
                self.max_message_size, self.block_capacity
            )));
        }
        if self.upload_retries == 0 {
            return Err(Error::InvalidConfig(
                "upload_retries must be at least 1".to_string(),
            ));
        }
        if self.blob_prefix.is_empty() || self.blob_prefix.contains('/') {
            return Err(Error::InvalidConfig(format!(
                "blob_prefix {:?} must be a non-empty single path segment",
                self.blob_prefix
            )));
        }
        self.key_templates.validate()?;
        Ok(())
    }

    /// Size of `message` once framed with the delimiter.
    pub fn framed_len(&self, message: &str) -> usize {
        message.len() + self.message_delimiter.len()
    }
}
