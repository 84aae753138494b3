use async_trait::async_trait;
use ingestlake_common::Result;

use crate::model::{EdgeUpsert, GraphEdge, GraphNode, NodeUpsert};

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or update by `(tenantId, logicalKey)`. On conflict: bump
    /// `version`, replace attributes, append one provenance entry.
    /// `logicalKey` and `tenantId` are immutable once assigned (spec §4.6).
    async fn upsert_node(&self, node: NodeUpsert) -> Result<GraphNode>;

    async fn upsert_edge(&self, edge: EdgeUpsert) -> Result<GraphEdge>;

    async fn get_node_by_logical_key(&self, tenant_id: &str, logical_key: &str) -> Result<Option<GraphNode>>;

    /// Ordered by `updatedAt DESC`, case-insensitive substring match over
    /// `displayName`/`canonicalPath` when `search` is set (spec §6.4).
    /// `offset` supports the signal evaluator's paged CDM row scan (spec
    /// §4.5 step 2); the UI/GraphQL façade always passes 0.
    async fn list_nodes(
        &self,
        tenant_id: &str,
        entity_types: Option<&[String]>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GraphNode>>;

    async fn list_edges(
        &self,
        tenant_id: &str,
        edge_types: Option<&[String]>,
        source_id: Option<&str>,
        target_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<GraphEdge>>;
}

pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    /// In-process `GraphStore`, used by the orchestrator/signal-evaluator in
    /// dev runs and by tests that don't need a real Postgres instance.
    #[derive(Default)]
    pub struct InMemoryGraphStore {
        nodes: Mutex<HashMap<(String, String), GraphNode>>,
        edges: Mutex<HashMap<(String, String), GraphEdge>>,
    }

    impl InMemoryGraphStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl GraphStore for InMemoryGraphStore {
        async fn upsert_node(&self, node: NodeUpsert) -> Result<GraphNode> {
            let logical_key = node.logical_key();
            let mut nodes = self.nodes.lock().unwrap();
            let map_key = (node.tenant_id.clone(), logical_key.clone());
            let now = Utc::now();

            let merged = match nodes.get(&map_key) {
                Some(existing) => {
                    let mut provenance = existing.provenance.clone();
                    provenance.push(node.provenance_entry);
                    GraphNode {
                        id: existing.id,
                        tenant_id: node.tenant_id,
                        project_id: node.project_id,
                        entity_type: node.entity_type,
                        display_name: node.display_name,
                        canonical_path: node.canonical_path,
                        source_system: node.source_system,
                        spec_ref: node.spec_ref,
                        properties: node.properties,
                        version: existing.version + 1,
                        phase: node.phase,
                        logical_key,
                        external_id: node.external_id,
                        provenance,
                        created_at: existing.created_at,
                        updated_at: now,
                    }
                }
                None => GraphNode {
                    id: Uuid::new_v4(),
                    tenant_id: node.tenant_id,
                    project_id: node.project_id,
                    entity_type: node.entity_type,
                    display_name: node.display_name,
                    canonical_path: node.canonical_path,
                    source_system: node.source_system,
                    spec_ref: node.spec_ref,
                    properties: node.properties,
                    version: 1,
                    phase: node.phase,
                    logical_key,
                    external_id: node.external_id,
                    provenance: vec![node.provenance_entry],
                    created_at: now,
                    updated_at: now,
                },
            };
            nodes.insert(map_key, merged.clone());
            Ok(merged)
        }

        async fn upsert_edge(&self, edge: EdgeUpsert) -> Result<GraphEdge> {
            let logical_key = edge.logical_key();
            let nodes = self.nodes.lock().unwrap();
            let source_entity_id = nodes
                .get(&(edge.tenant_id.clone(), edge.source_logical_key.clone()))
                .map(|n| n.id);
            let target_entity_id = nodes
                .get(&(edge.tenant_id.clone(), edge.target_logical_key.clone()))
                .map(|n| n.id);
            drop(nodes);

            if source_entity_id.is_none() {
                tracing::warn!(
                    tenant_id = %edge.tenant_id,
                    logical_key = %edge.source_logical_key,
                    "upsert_edge: source endpoint unresolved, edge stored as orphan"
                );
            }
            if target_entity_id.is_none() {
                tracing::warn!(
                    tenant_id = %edge.tenant_id,
                    logical_key = %edge.target_logical_key,
                    "upsert_edge: target endpoint unresolved, edge stored as orphan"
                );
            }

            let mut edges = self.edges.lock().unwrap();
            let map_key = (edge.tenant_id.clone(), logical_key.clone());
            let merged = match edges.get(&map_key) {
                Some(existing) => {
                    let mut provenance = existing.provenance.clone();
                    provenance.push(edge.provenance_entry);
                    GraphEdge {
                        id: existing.id,
                        tenant_id: edge.tenant_id,
                        project_id: edge.project_id,
                        edge_type: edge.edge_type,
                        source_entity_id,
                        target_entity_id,
                        confidence: edge.confidence,
                        spec_ref: edge.spec_ref,
                        metadata: edge.metadata,
                        logical_key,
                        source_logical_key: edge.source_logical_key,
                        target_logical_key: edge.target_logical_key,
                        provenance,
                        created_at: existing.created_at,
                    }
                }
                None => GraphEdge {
                    id: Uuid::new_v4(),
                    tenant_id: edge.tenant_id,
                    project_id: edge.project_id,
                    edge_type: edge.edge_type,
                    source_entity_id,
                    target_entity_id,
                    confidence: edge.confidence,
                    spec_ref: edge.spec_ref,
                    metadata: edge.metadata,
                    logical_key,
                    source_logical_key: edge.source_logical_key,
                    target_logical_key: edge.target_logical_key,
                    provenance: vec![edge.provenance_entry],
                    created_at: Utc::now(),
                },
            };
            edges.insert(map_key, merged.clone());
            Ok(merged)
        }

        async fn get_node_by_logical_key(&self, tenant_id: &str, logical_key: &str) -> Result<Option<GraphNode>> {
            Ok(self
                .nodes
                .lock()
                .unwrap()
                .get(&(tenant_id.to_string(), logical_key.to_string()))
                .cloned())
        }

        async fn list_nodes(
            &self,
            tenant_id: &str,
            entity_types: Option<&[String]>,
            search: Option<&str>,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<GraphNode>> {
            let search = search.map(|s| s.to_lowercase());
            let mut rows: Vec<GraphNode> = self
                .nodes
                .lock()
                .unwrap()
                .values()
                .filter(|n| n.tenant_id == tenant_id)
                .filter(|n| entity_types.map(|ts| ts.contains(&n.entity_type)).unwrap_or(true))
                .filter(|n| match &search {
                    Some(s) => {
                        n.display_name.to_lowercase().contains(s) || n.canonical_path.to_lowercase().contains(s)
                    }
                    None => true,
                })
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
            let start = offset.max(0) as usize;
            let end = start.saturating_add(limit.max(0) as usize);
            Ok(rows.into_iter().skip(start).take(end - start).collect())
        }

        async fn list_edges(
            &self,
            tenant_id: &str,
            edge_types: Option<&[String]>,
            source_id: Option<&str>,
            target_id: Option<&str>,
            limit: i64,
        ) -> Result<Vec<GraphEdge>> {
            let mut rows: Vec<GraphEdge> = self
                .edges
                .lock()
                .unwrap()
                .values()
                .filter(|e| e.tenant_id == tenant_id)
                .filter(|e| edge_types.map(|ts| ts.contains(&e.edge_type)).unwrap_or(true))
                .filter(|e| source_id.map(|s| e.source_entity_id.map(|id| id.to_string()) == Some(s.to_string())).unwrap_or(true))
                .filter(|e| target_id.map(|t| e.target_entity_id.map(|id| id.to_string()) == Some(t.to_string())).unwrap_or(true))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            rows.truncate(limit.max(0) as usize);
            Ok(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ingestlake_common::ProvenanceEntry;

    use super::memory::InMemoryGraphStore;
    use super::*;

    fn provenance(path: &str) -> ProvenanceEntry {
        ProvenanceEntry {
            endpoint_id: "ep-1".into(),
            ts: Utc::now(),
            canonical_path: path.to_string(),
        }
    }

    /// Minimal subscriber that records each event's message, just enough
    /// to assert a `tracing::warn!` fired without pulling in a dedicated
    /// test-capture crate.
    struct MessageRecorder {
        messages: std::sync::Mutex<Vec<String>>,
    }

    impl tracing::Subscriber for MessageRecorder {
        fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }
        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}
        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}
        fn event(&self, event: &tracing::Event<'_>) {
            struct MessageVisitor(String);
            impl tracing::field::Visit for MessageVisitor {
                fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                    if field.name() == "message" {
                        self.0 = format!("{value:?}");
                    }
                }
            }
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.messages.lock().unwrap().push(visitor.0);
        }
        fn enter(&self, _: &tracing::span::Id) {}
        fn exit(&self, _: &tracing::span::Id) {}
    }

    fn node(tenant: &str, path: &str) -> NodeUpsert {
        NodeUpsert {
            tenant_id: tenant.into(),
            project_id: None,
            entity_type: "catalog.dataset".into(),
            display_name: "orders".into(),
            canonical_path: path.into(),
            source_system: Some("warehouse".into()),
            spec_ref: None,
            properties: serde_json::json!({"rows": 10}),
            phase: None,
            external_id: serde_json::json!({}),
            provenance_entry: provenance(path),
        }
    }

    #[tokio::test]
    async fn upsert_node_twice_bumps_version_and_preserves_id() {
        let store = InMemoryGraphStore::new();
        let first = store.upsert_node(node("t1", "warehouse/public/orders")).await.unwrap();
        assert_eq!(first.version, 1);

        let second = store.upsert_node(node("t1", "warehouse/public/orders")).await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.id, first.id);
        assert_eq!(second.logical_key, first.logical_key);
        assert_eq!(second.provenance.len(), 2);
    }

    #[tokio::test]
    async fn distinct_canonical_paths_produce_distinct_nodes() {
        let store = InMemoryGraphStore::new();
        let a = store.upsert_node(node("t1", "warehouse/public/orders")).await.unwrap();
        let b = store.upsert_node(node("t1", "warehouse/public/customers")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.logical_key, b.logical_key);
    }

    #[tokio::test]
    async fn upsert_edge_before_target_node_exists_is_allowed_but_unresolved() {
        let store = InMemoryGraphStore::new();
        let source = store.upsert_node(node("t1", "warehouse/public/orders")).await.unwrap();

        let recorder = std::sync::Arc::new(MessageRecorder { messages: std::sync::Mutex::new(Vec::new()) });
        let edge = tracing::subscriber::with_default(recorder.clone(), || {
            futures::executor::block_on(store.upsert_edge(EdgeUpsert {
                tenant_id: "t1".into(),
                project_id: None,
                edge_type: "derives_from".into(),
                source_logical_key: source.logical_key.clone(),
                target_logical_key: "t1::catalog.dataset::warehouse/public/missing".into(),
                confidence: 0.9,
                spec_ref: None,
                metadata: serde_json::json!({}),
                provenance_entry: provenance("warehouse/public/orders"),
            }))
        })
        .unwrap();

        assert_eq!(edge.source_entity_id, Some(source.id));
        assert_eq!(edge.target_entity_id, None);

        let messages = recorder.messages.lock().unwrap();
        assert!(
            messages.iter().any(|m| m.contains("target endpoint unresolved")),
            "expected a warning about the unresolved target, got: {messages:?}"
        );
        assert!(
            !messages.iter().any(|m| m.contains("source endpoint unresolved")),
            "source resolved fine, should not have warned: {messages:?}"
        );
    }

    #[tokio::test]
    async fn list_nodes_search_is_case_insensitive_and_ordered_by_updated_at_desc() {
        let store = InMemoryGraphStore::new();
        store.upsert_node(node("t1", "warehouse/public/orders")).await.unwrap();
        store.upsert_node(node("t1", "warehouse/public/customers")).await.unwrap();

        let found = store
            .list_nodes("t1", None, Some("ORDERS"), 10, 0)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].canonical_path.contains("orders"));
    }
}
