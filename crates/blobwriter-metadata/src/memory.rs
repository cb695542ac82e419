//! In-Memory Checkpoint Store
//!
//! Keeps checkpoint entries in a process-local map. Not durable across
//! restarts; intended for tests and for embedding where the surrounding
//! process provides its own persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use blobwriter_core::{Checkpoint, KeyTemplates};
use tokio::sync::RwLock;

use crate::{error::Result, CheckpointStore, RawEntries};

pub struct InMemoryCheckpointStore {
    templates: KeyTemplates,
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryCheckpointStore {
    pub fn new(templates: KeyTemplates) -> Result<Self> {
        templates.validate()?;
        Ok(Self {
            templates,
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// Raw key/value snapshot, for assertions on the stored layout.
    pub async fn entries(&self) -> HashMap<String, String> {
        self.entries.read().await.clone()
    }

    /// Store a raw value under `key`, bypassing checkpoint encoding.
    pub async fn put_raw(&self, key: &str, value: &str) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self {
            templates: KeyTemplates::default(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn clear(&self, partition: u32) -> Result<()> {
        let keys = self.templates.render(partition);
        let mut entries = self.entries.write().await;
        for key in keys.all() {
            entries.remove(key);
        }
        Ok(())
    }

    async fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        let keys = self.templates.render(checkpoint.partition());
        let values = RawEntries::encode(checkpoint);

        let mut entries = self.entries.write().await;
        for (key, value) in keys.all().into_iter().zip(values) {
            entries.insert(key.to_string(), value);
        }
        Ok(())
    }

    async fn read(&self, partition: u32) -> Result<Option<Checkpoint>> {
        let keys = self.templates.render(partition);
        let entries = self.entries.read().await;

        RawEntries {
            transaction_id: entries.get(&keys.transaction_id).cloned(),
            first_block: entries.get(&keys.first_block).cloned(),
            last_block: entries.get(&keys.last_block).cloned(),
        }
        .decode(partition)
    }
}
