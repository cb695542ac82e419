//! Configuration loading for the blobwriter binary
//!
//! Order of precedence, lowest first:
//!
//! 1. `WriterConfig::default()`
//! 2. TOML file given by `--config` / `BLOBWRITER_CONFIG`
//! 3. Environment overrides (`BLOBWRITER_MAX_MESSAGE_SIZE`,
//!    `BLOBWRITER_BLOCK_CAPACITY`, `BLOBWRITER_BLOB_PREFIX`)
//!
//! The result is validated before any partition is opened.

use std::path::Path;

use anyhow::{Context, Result};
use blobwriter_storage::WriterConfig;

pub const MAX_MESSAGE_SIZE_ENV: &str = "BLOBWRITER_MAX_MESSAGE_SIZE";
pub const BLOCK_CAPACITY_ENV: &str = "BLOBWRITER_BLOCK_CAPACITY";
pub const BLOB_PREFIX_ENV: &str = "BLOBWRITER_BLOB_PREFIX";

/// Load, override from the process environment, and validate.
pub fn load(path: Option<&Path>) -> Result<WriterConfig> {
    load_with(path, |key| std::env::var(key).ok())
}

/// Same as [`load`] with an explicit variable lookup.
pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<WriterConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => WriterConfig::default(),
    };

    apply_overrides(&mut config, lookup)?;
    config.validate().context("Invalid writer configuration")?;
    Ok(config)
}

fn apply_overrides<F>(config: &mut WriterConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(MAX_MESSAGE_SIZE_ENV) {
        config.max_message_size = value
            .parse()
            .with_context(|| format!("{} must be a byte count, got {:?}", MAX_MESSAGE_SIZE_ENV, value))?;
    }
    if let Some(value) = lookup(BLOCK_CAPACITY_ENV) {
        config.block_capacity = value
            .parse()
            .with_context(|| format!("{} must be a byte count, got {:?}", BLOCK_CAPACITY_ENV, value))?;
    }
    if let Some(value) = lookup(BLOB_PREFIX_ENV) {
        config.blob_prefix = value;
    }
    Ok(())
}
