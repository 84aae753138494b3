//! Versioned, namespaced JSON state (spec §3.1 `CheckpointRecord`/
//! `TransientState`, §4.3, §6.1, §6.7 `kv_entries`).
//!
//! Writers supply `expected_version` on every `put`; the store rejects the
//! write with [`IngestError::CheckpointConflict`] on mismatch rather than
//! silently overwriting, so the orchestrator's checkpoint CAS (spec §8
//! "Checkpoint CAS") is enforced by the store itself, not by caller
//! discipline.

mod memory;
mod postgres;
pub mod types;

pub use memory::InMemoryKvStore;
pub use postgres::PostgresKvStore;
pub use types::{KvEntry, KvKey};

use async_trait::async_trait;
use ingestlake_common::Result;

/// CAS put semantics. `None` means "must not already exist".
pub type ExpectedVersion = Option<i64>;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &KvKey) -> Result<Option<KvEntry>>;

    /// Compare-and-set put. On success, returns the new entry (version
    /// incremented by 1, or 1 for a brand-new key). On mismatch, returns
    /// [`IngestError::CheckpointConflict`] carrying the expected and actual
    /// versions so the caller can retry a read-merge-write.
    async fn put(
        &self,
        key: &KvKey,
        value: serde_json::Value,
        expected_version: ExpectedVersion,
    ) -> Result<KvEntry>;

    async fn delete(&self, key: &KvKey) -> Result<()>;

    /// List all keys under a `(namespace, scope_id)` pair.
    async fn list(&self, namespace: &str, scope_id: &str) -> Result<Vec<KvEntry>>;
}

#[cfg(test)]
mod contract_tests {
    //! Shared behavioral contract, run against every implementation.
    use super::*;
    use serde_json::json;

    async fn exercise_cas_contract(store: &dyn KvStore) {
        let key = KvKey::new("ingestion", "endpoint-1", "unit-1");

        // Fresh key: put with expected_version=None succeeds, version=1.
        let entry = store.put(&key, json!({"cursor": "a"}), None).await.unwrap();
        assert_eq!(entry.version, 1);

        // Put with wrong expected_version fails, cursor unchanged.
        let err = store
            .put(&key, json!({"cursor": "b"}), Some(999))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ingestlake_common::IngestError::CheckpointConflict { .. }
        ));
        let still_a = store.get(&key).await.unwrap().unwrap();
        assert_eq!(still_a.value["cursor"], "a");

        // Put with correct expected_version succeeds, version bumps.
        let entry2 = store.put(&key, json!({"cursor": "b"}), Some(1)).await.unwrap();
        assert_eq!(entry2.version, 2);
        assert_eq!(entry2.value["cursor"], "b");

        // Fresh-key put again (None) now fails because it exists.
        let err = store.put(&key, json!({"cursor": "c"}), None).await.unwrap_err();
        assert!(matches!(
            err,
            ingestlake_common::IngestError::CheckpointConflict { .. }
        ));

        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_satisfies_cas_contract() {
        let store = InMemoryKvStore::new();
        exercise_cas_contract(&store).await;
    }

    #[tokio::test]
    async fn list_returns_all_keys_in_scope() {
        let store = InMemoryKvStore::new();
        store
            .put(&KvKey::new("ingestion", "e1", "unit-a"), json!({}), None)
            .await
            .unwrap();
        store
            .put(&KvKey::new("ingestion", "e1", "unit-b"), json!({}), None)
            .await
            .unwrap();
        store
            .put(&KvKey::new("ingestion", "e2", "unit-a"), json!({}), None)
            .await
            .unwrap();

        let entries = store.list("ingestion", "e1").await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}
