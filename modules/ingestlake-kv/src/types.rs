use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `(namespace, scopeId, key)` — the compound key every `KvStore` operation
/// addresses (spec §6.1). Namespaces in use: `ingestion`, `ucl`, `signals`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KvKey {
    pub namespace: String,
    pub scope_id: String,
    pub key: String,
}

impl KvKey {
    pub fn new(namespace: impl Into<String>, scope_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            scope_id: scope_id.into(),
            key: key.into(),
        }
    }

    /// Build the checkpoint key for an `(endpoint, unit, sink, vendor)`
    /// quadruple, per spec §4.3 step 1.
    pub fn ingestion(endpoint_id: &str, unit_id: &str, sink_id: Option<&str>, vendor_key: &str) -> Self {
        let sink_segment = sink_id.unwrap_or("none");
        Self::new(
            "ingestion",
            endpoint_id,
            format!("unit::{unit_id}::sink::{sink_segment}::vendor::{vendor_key}"),
        )
    }

    /// Same namespace and scope as [`KvKey::ingestion`], distinct key:
    /// the connector-private `TransientState` (spec §3.1).
    pub fn transient_state(endpoint_id: &str, unit_id: &str, sink_id: Option<&str>, vendor_key: &str) -> Self {
        let sink_segment = sink_id.unwrap_or("none");
        Self::new(
            "ingestion",
            endpoint_id,
            format!("unit::{unit_id}::sink::{sink_segment}::vendor::{vendor_key}::transient"),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvEntry {
    pub value: serde_json::Value,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingestion_key_shape_matches_spec_namespacing() {
        let key = KvKey::ingestion("ep-1", "jira.issues", Some("sink-a"), "ep-1");
        assert_eq!(key.namespace, "ingestion");
        assert_eq!(key.scope_id, "ep-1");
        assert_eq!(key.key, "unit::jira.issues::sink::sink-a::vendor::ep-1");
    }

    #[test]
    fn ingestion_key_without_sink_uses_placeholder() {
        let key = KvKey::ingestion("ep-1", "jira.issues", None, "ep-1");
        assert!(key.key.contains("sink::none"));
    }
}
