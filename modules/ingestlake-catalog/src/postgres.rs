use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingestlake_common::{IngestError, ProvenanceEntry, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::model::{EdgeUpsert, GraphEdge, GraphNode, NodeUpsert};
use crate::store::GraphStore;

#[derive(Clone)]
pub struct PostgresGraphStore {
    pool: PgPool,
}

impl PostgresGraphStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| IngestError::Other(e.into()))?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    id: Uuid,
    tenant_id: String,
    project_id: Option<String>,
    entity_type: String,
    display_name: String,
    canonical_path: String,
    source_system: Option<String>,
    spec_ref: Option<String>,
    properties: serde_json::Value,
    version: i32,
    phase: Option<String>,
    logical_key: String,
    external_id: serde_json::Value,
    provenance: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NodeRow {
    fn into_node(self) -> Result<GraphNode> {
        let provenance: Vec<ProvenanceEntry> =
            serde_json::from_value(self.provenance).map_err(|e| IngestError::Other(e.into()))?;
        Ok(GraphNode {
            id: self.id,
            tenant_id: self.tenant_id,
            project_id: self.project_id,
            entity_type: self.entity_type,
            display_name: self.display_name,
            canonical_path: self.canonical_path,
            source_system: self.source_system,
            spec_ref: self.spec_ref,
            properties: self.properties,
            version: self.version,
            phase: self.phase,
            logical_key: self.logical_key,
            external_id: self.external_id,
            provenance,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EdgeRow {
    id: Uuid,
    tenant_id: String,
    project_id: Option<String>,
    edge_type: String,
    source_entity_id: Option<Uuid>,
    target_entity_id: Option<Uuid>,
    confidence: f32,
    spec_ref: Option<String>,
    metadata: serde_json::Value,
    logical_key: String,
    source_logical_key: String,
    target_logical_key: String,
    provenance: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl EdgeRow {
    fn into_edge(self) -> Result<GraphEdge> {
        let provenance: Vec<ProvenanceEntry> =
            serde_json::from_value(self.provenance).map_err(|e| IngestError::Other(e.into()))?;
        Ok(GraphEdge {
            id: self.id,
            tenant_id: self.tenant_id,
            project_id: self.project_id,
            edge_type: self.edge_type,
            source_entity_id: self.source_entity_id,
            target_entity_id: self.target_entity_id,
            confidence: self.confidence,
            spec_ref: self.spec_ref,
            metadata: self.metadata,
            logical_key: self.logical_key,
            source_logical_key: self.source_logical_key,
            target_logical_key: self.target_logical_key,
            provenance,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    async fn upsert_node(&self, node: NodeUpsert) -> Result<GraphNode> {
        let logical_key = node.logical_key();
        let provenance_entry = serde_json::to_value(&node.provenance_entry).map_err(|e| IngestError::Other(e.into()))?;

        let row = sqlx::query_as::<_, NodeRow>(
            r#"
            INSERT INTO graph_nodes (
                tenant_id, project_id, entity_type, display_name, canonical_path,
                source_system, spec_ref, properties, version, phase, logical_key,
                external_id, provenance
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9, $10, $11, jsonb_build_array($12::jsonb))
            ON CONFLICT (tenant_id, logical_key) DO UPDATE SET
                project_id = EXCLUDED.project_id,
                entity_type = EXCLUDED.entity_type,
                display_name = EXCLUDED.display_name,
                canonical_path = EXCLUDED.canonical_path,
                source_system = EXCLUDED.source_system,
                spec_ref = EXCLUDED.spec_ref,
                properties = EXCLUDED.properties,
                version = graph_nodes.version + 1,
                phase = EXCLUDED.phase,
                external_id = EXCLUDED.external_id,
                provenance = graph_nodes.provenance || EXCLUDED.provenance,
                updated_at = now()
            RETURNING id, tenant_id, project_id, entity_type, display_name, canonical_path,
                      source_system, spec_ref, properties, version, phase, logical_key,
                      external_id, provenance, created_at, updated_at
            "#,
        )
        .bind(&node.tenant_id)
        .bind(&node.project_id)
        .bind(&node.entity_type)
        .bind(&node.display_name)
        .bind(&node.canonical_path)
        .bind(&node.source_system)
        .bind(&node.spec_ref)
        .bind(&node.properties)
        .bind(&node.phase)
        .bind(&logical_key)
        .bind(&node.external_id)
        .bind(&provenance_entry)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;

        row.into_node()
    }

    async fn upsert_edge(&self, edge: EdgeUpsert) -> Result<GraphEdge> {
        let logical_key = edge.logical_key();
        let provenance_entry = serde_json::to_value(&edge.provenance_entry).map_err(|e| IngestError::Other(e.into()))?;

        if self.get_node_by_logical_key(&edge.tenant_id, &edge.source_logical_key).await?.is_none() {
            tracing::warn!(
                tenant_id = %edge.tenant_id,
                logical_key = %edge.source_logical_key,
                "upsert_edge: source endpoint unresolved, edge stored as orphan"
            );
        }
        if self.get_node_by_logical_key(&edge.tenant_id, &edge.target_logical_key).await?.is_none() {
            tracing::warn!(
                tenant_id = %edge.tenant_id,
                logical_key = %edge.target_logical_key,
                "upsert_edge: target endpoint unresolved, edge stored as orphan"
            );
        }

        let row = sqlx::query_as::<_, EdgeRow>(
            r#"
            INSERT INTO graph_edges (
                tenant_id, project_id, edge_type, source_entity_id, target_entity_id,
                confidence, spec_ref, metadata, logical_key, source_logical_key,
                target_logical_key, provenance
            )
            SELECT $1, $2, $3, src.id, tgt.id, $6, $7, $8, $9, $4, $5,
                   jsonb_build_array($10::jsonb)
            FROM (SELECT 1) AS _dummy
            LEFT JOIN graph_nodes src ON src.tenant_id = $1 AND src.logical_key = $4
            LEFT JOIN graph_nodes tgt ON tgt.tenant_id = $1 AND tgt.logical_key = $5
            ON CONFLICT (tenant_id, logical_key) DO UPDATE SET
                project_id = EXCLUDED.project_id,
                edge_type = EXCLUDED.edge_type,
                source_entity_id = EXCLUDED.source_entity_id,
                target_entity_id = EXCLUDED.target_entity_id,
                confidence = EXCLUDED.confidence,
                spec_ref = EXCLUDED.spec_ref,
                metadata = EXCLUDED.metadata,
                provenance = graph_edges.provenance || EXCLUDED.provenance
            RETURNING id, tenant_id, project_id, edge_type, source_entity_id, target_entity_id,
                      confidence, spec_ref, metadata, logical_key, source_logical_key,
                      target_logical_key, provenance, created_at
            "#,
        )
        .bind(&edge.tenant_id)
        .bind(&edge.project_id)
        .bind(&edge.edge_type)
        .bind(&edge.source_logical_key)
        .bind(&edge.target_logical_key)
        .bind(edge.confidence)
        .bind(&edge.spec_ref)
        .bind(&edge.metadata)
        .bind(&logical_key)
        .bind(&provenance_entry)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;

        row.into_edge()
    }

    async fn get_node_by_logical_key(&self, tenant_id: &str, logical_key: &str) -> Result<Option<GraphNode>> {
        let row = sqlx::query_as::<_, NodeRow>(
            "SELECT * FROM graph_nodes WHERE tenant_id = $1 AND logical_key = $2",
        )
        .bind(tenant_id)
        .bind(logical_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        row.map(NodeRow::into_node).transpose()
    }

    async fn list_nodes(
        &self,
        tenant_id: &str,
        entity_types: Option<&[String]>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GraphNode>> {
        let like = search.map(|s| format!("%{}%", s.to_lowercase()));
        let rows = sqlx::query_as::<_, NodeRow>(
            r#"
            SELECT * FROM graph_nodes
            WHERE tenant_id = $1
              AND ($2::text[] IS NULL OR entity_type = ANY($2))
              AND ($3::text IS NULL OR lower(display_name) LIKE $3 OR lower(canonical_path) LIKE $3)
            ORDER BY updated_at DESC, id ASC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(tenant_id)
        .bind(entity_types)
        .bind(&like)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        rows.into_iter().map(NodeRow::into_node).collect()
    }

    async fn list_edges(
        &self,
        tenant_id: &str,
        edge_types: Option<&[String]>,
        source_id: Option<&str>,
        target_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<GraphEdge>> {
        let source_uuid = source_id.and_then(|s| Uuid::parse_str(s).ok());
        let target_uuid = target_id.and_then(|s| Uuid::parse_str(s).ok());
        let rows = sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT * FROM graph_edges
            WHERE tenant_id = $1
              AND ($2::text[] IS NULL OR edge_type = ANY($2))
              AND ($3::uuid IS NULL OR source_entity_id = $3)
              AND ($4::uuid IS NULL OR target_entity_id = $4)
            ORDER BY created_at DESC
            LIMIT $5
            "#,
        )
        .bind(tenant_id)
        .bind(edge_types)
        .bind(source_uuid)
        .bind(target_uuid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        rows.into_iter().map(EdgeRow::into_edge).collect()
    }
}
