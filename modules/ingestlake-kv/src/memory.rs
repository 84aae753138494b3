use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use ingestlake_common::{IngestError, Result};

use crate::types::{KvEntry, KvKey};
use crate::{ExpectedVersion, KvStore};

/// In-process `KvStore`, used by tests and by standalone/dev runs of the
/// orchestrator and signal evaluator.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<KvKey, KvEntry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &KvKey) -> Result<Option<KvEntry>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(
        &self,
        key: &KvKey,
        value: serde_json::Value,
        expected_version: ExpectedVersion,
    ) -> Result<KvEntry> {
        let mut entries = self.entries.lock().unwrap();
        let existing = entries.get(key);

        let next_version = match (expected_version, existing) {
            (None, None) => 1,
            (None, Some(existing)) => {
                return Err(IngestError::CheckpointConflict {
                    expected: 0,
                    actual: existing.version,
                })
            }
            (Some(expected), Some(existing)) if expected == existing.version => existing.version + 1,
            (Some(expected), Some(existing)) => {
                return Err(IngestError::CheckpointConflict {
                    expected,
                    actual: existing.version,
                })
            }
            (Some(expected), None) => {
                return Err(IngestError::CheckpointConflict { expected, actual: 0 })
            }
        };

        let entry = KvEntry {
            value,
            version: next_version,
            updated_at: Utc::now(),
        };
        entries.insert(key.clone(), entry.clone());
        Ok(entry)
    }

    async fn delete(&self, key: &KvKey) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, namespace: &str, scope_id: &str) -> Result<Vec<KvEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.namespace == namespace && k.scope_id == scope_id)
            .map(|(_, v)| v.clone())
            .collect())
    }
}
