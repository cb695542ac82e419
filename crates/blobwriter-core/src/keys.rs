//! Recovery-Store Key Naming
//!
//! A partition's checkpoint is stored as three independent keys (transaction id,
//! first block id, last block id). Their names come from configurable templates
//! containing a single `{partition}` placeholder, rendered zero-padded to five
//! digits:
//!
//! ```text
//! partition_{partition}_transactionid  →  partition_00002_transactionid
//! ```
//!
//! Rendering is a pure function of the templates and the partition index, so
//! several partitions can be served from one process without any shared
//! "current partition" key state.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const PARTITION_PLACEHOLDER: &str = "{partition}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTemplates {
    #[serde(default = "default_transaction_id")]
    pub transaction_id: String,

    #[serde(default = "default_first_block")]
    pub first_block: String,

    #[serde(default = "default_last_block")]
    pub last_block: String,
}

impl Default for KeyTemplates {
    fn default() -> Self {
        Self {
            transaction_id: default_transaction_id(),
            first_block: default_first_block(),
            last_block: default_last_block(),
        }
    }
}

fn default_transaction_id() -> String {
    "partition_{partition}_transactionid".to_string()
}

fn default_first_block() -> String {
    "partition_{partition}_firstblock".to_string()
}

fn default_last_block() -> String {
    "partition_{partition}_lastblock".to_string()
}

impl KeyTemplates {
    /// Check every template carries exactly one placeholder and that the three
    /// templates cannot collide.
    pub fn validate(&self) -> Result<()> {
        for (name, template) in [
            ("transaction_id", &self.transaction_id),
            ("first_block", &self.first_block),
            ("last_block", &self.last_block),
        ] {
            let count = template.matches(PARTITION_PLACEHOLDER).count();
            if count != 1 {
                return Err(Error::InvalidKeyTemplate(format!(
                    "{} template {:?} must contain {} exactly once (found {})",
                    name, template, PARTITION_PLACEHOLDER, count
                )));
            }
        }

        if self.transaction_id == self.first_block
            || self.transaction_id == self.last_block
            || self.first_block == self.last_block
        {
            return Err(Error::InvalidKeyTemplate(
                "transaction_id, first_block and last_block templates must differ".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the concrete key names for one partition.
    pub fn render(&self, partition: u32) -> PartitionKeys {
        let index = format!("{:05}", partition);
        PartitionKeys {
            transaction_id: self.transaction_id.replace(PARTITION_PLACEHOLDER, &index),
            first_block: self.first_block.replace(PARTITION_PLACEHOLDER, &index),
            last_block: self.last_block.replace(PARTITION_PLACEHOLDER, &index),
        }
    }
}

/// Concrete recovery-store keys of a single partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKeys {
    pub transaction_id: String,
    pub first_block: String,
    pub last_block: String,
}

impl PartitionKeys {
    pub fn all(&self) -> [&str; 3] {
        [&self.transaction_id, &self.first_block, &self.last_block]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_templates_render() {
        let keys = KeyTemplates::default().render(2);
        assert_eq!(keys.transaction_id, "partition_00002_transactionid");
        assert_eq!(keys.first_block, "partition_00002_firstblock");
        assert_eq!(keys.last_block, "partition_00002_lastblock");
    }

    #[test]
    fn test_default_templates_are_valid() {
        KeyTemplates::default().validate().unwrap();
    }

    #[test]
    fn test_missing_placeholder_rejected() {
        let templates = KeyTemplates {
            transaction_id: "txid".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            templates.validate(),
            Err(Error::InvalidKeyTemplate(_))
        ));
    }

    #[test]
    fn test_repeated_placeholder_rejected() {
        let templates = KeyTemplates {
            first_block: "{partition}/{partition}/first".to_string(),
            ..Default::default()
        };
        assert!(templates.validate().is_err());
    }

    #[test]
    fn test_colliding_templates_rejected() {
        let templates = KeyTemplates {
            first_block: "k_{partition}".to_string(),
            last_block: "k_{partition}".to_string(),
            ..Default::default()
        };
        assert!(templates.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let templates: KeyTemplates =
            serde_json::from_str(r#"{"transaction_id": "tx/{partition}"}"#).unwrap();
        assert_eq!(templates.transaction_id, "tx/{partition}");
        assert_eq!(templates.first_block, default_first_block());
        assert_eq!(templates.render(7).transaction_id, "tx/00007");
    }
}
