use chrono::{DateTime, Utc};
use ingestlake_common::{join_identity, ProvenanceEntry};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub tenant_id: String,
    pub project_id: Option<String>,
    pub entity_type: String,
    pub display_name: String,
    pub canonical_path: String,
    pub source_system: Option<String>,
    pub spec_ref: Option<String>,
    pub properties: serde_json::Value,
    pub version: i32,
    pub phase: Option<String>,
    pub logical_key: String,
    pub external_id: serde_json::Value,
    pub provenance: Vec<ProvenanceEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for `upsert_node`. `id`, `version`, timestamps and
/// `provenance` are server-assigned.
#[derive(Debug, Clone)]
pub struct NodeUpsert {
    pub tenant_id: String,
    pub project_id: Option<String>,
    pub entity_type: String,
    pub display_name: String,
    pub canonical_path: String,
    pub source_system: Option<String>,
    pub spec_ref: Option<String>,
    pub properties: serde_json::Value,
    pub phase: Option<String>,
    pub external_id: serde_json::Value,
    pub provenance_entry: ProvenanceEntry,
}

impl NodeUpsert {
    /// `logicalKey` is derived from `{tenantId, entityType, canonicalPath}`
    /// per spec §4.6 and is immutable once assigned.
    pub fn logical_key(&self) -> String {
        join_identity([self.tenant_id.as_str(), self.entity_type.as_str(), self.canonical_path.as_str()])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: Uuid,
    pub tenant_id: String,
    pub project_id: Option<String>,
    pub edge_type: String,
    pub source_entity_id: Option<Uuid>,
    pub target_entity_id: Option<Uuid>,
    pub confidence: f32,
    pub spec_ref: Option<String>,
    pub metadata: serde_json::Value,
    pub logical_key: String,
    pub source_logical_key: String,
    pub target_logical_key: String,
    pub provenance: Vec<ProvenanceEntry>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EdgeUpsert {
    pub tenant_id: String,
    pub project_id: Option<String>,
    pub edge_type: String,
    pub source_logical_key: String,
    pub target_logical_key: String,
    pub confidence: f32,
    pub spec_ref: Option<String>,
    pub metadata: serde_json::Value,
    pub provenance_entry: ProvenanceEntry,
}

impl EdgeUpsert {
    pub fn logical_key(&self) -> String {
        join_identity([
            self.tenant_id.as_str(),
            self.edge_type.as_str(),
            self.source_logical_key.as_str(),
            self.target_logical_key.as_str(),
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub domain: String,
    pub id: String,
    pub tenant_id: String,
    pub project_id: Option<String>,
    pub labels: Vec<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deterministic identity for `catalog.dataset` payloads, per spec §3.1:
/// `(tenantId, sourceId, database?, schema, table)`.
pub fn dataset_identity(
    tenant_id: &str,
    source_id: &str,
    database: Option<&str>,
    schema: &str,
    table: &str,
) -> String {
    join_identity([tenant_id, source_id, database.unwrap_or(""), schema, table])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_logical_key_is_stable_for_same_identity() {
        let a = NodeUpsert {
            tenant_id: "t1".into(),
            project_id: None,
            entity_type: "catalog.dataset".into(),
            display_name: "orders".into(),
            canonical_path: "warehouse/public/orders".into(),
            source_system: None,
            spec_ref: None,
            properties: serde_json::json!({}),
            phase: None,
            external_id: serde_json::json!({}),
            provenance_entry: ProvenanceEntry {
                endpoint_id: "ep-1".into(),
                ts: Utc::now(),
                canonical_path: "warehouse/public/orders".into(),
            },
        };
        let b_key = a.logical_key();
        assert_eq!(a.logical_key(), b_key);
    }

    #[test]
    fn dataset_identity_ignores_missing_database() {
        let with_db = dataset_identity("t1", "src", Some("db"), "public", "orders");
        let without_db = dataset_identity("t1", "src", None, "public", "orders");
        assert_ne!(with_db, without_db);
    }
}
