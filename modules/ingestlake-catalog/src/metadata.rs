use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingestlake_common::{IngestError, Result};
use sqlx::PgPool;

use crate::model::MetadataRecord;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Upsert by `(domain, id)` — full payload replace, no versioning
    /// (unlike `GraphStore`, which tracks provenance and version; spec §6.7
    /// `metadata_records`).
    async fn upsert_record(&self, record: MetadataRecord) -> Result<MetadataRecord>;

    async fn get_record(&self, domain: &str, id: &str) -> Result<Option<MetadataRecord>>;

    async fn list_by_domain(&self, domain: &str, tenant_id: &str, limit: i64) -> Result<Vec<MetadataRecord>>;
}

#[derive(Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MetadataRow {
    domain: String,
    id: String,
    tenant_id: String,
    project_id: Option<String>,
    labels: Vec<String>,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MetadataRow> for MetadataRecord {
    fn from(row: MetadataRow) -> Self {
        MetadataRecord {
            domain: row.domain,
            id: row.id,
            tenant_id: row.tenant_id,
            project_id: row.project_id,
            labels: row.labels,
            payload: row.payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn upsert_record(&self, record: MetadataRecord) -> Result<MetadataRecord> {
        let row = sqlx::query_as::<_, MetadataRow>(
            r#"
            INSERT INTO metadata_records (domain, id, tenant_id, project_id, labels, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (domain, id) DO UPDATE SET
                tenant_id = EXCLUDED.tenant_id,
                project_id = EXCLUDED.project_id,
                labels = EXCLUDED.labels,
                payload = EXCLUDED.payload,
                updated_at = now()
            RETURNING domain, id, tenant_id, project_id, labels, payload, created_at, updated_at
            "#,
        )
        .bind(&record.domain)
        .bind(&record.id)
        .bind(&record.tenant_id)
        .bind(&record.project_id)
        .bind(&record.labels)
        .bind(&record.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        Ok(row.into())
    }

    async fn get_record(&self, domain: &str, id: &str) -> Result<Option<MetadataRecord>> {
        let row = sqlx::query_as::<_, MetadataRow>(
            "SELECT * FROM metadata_records WHERE domain = $1 AND id = $2",
        )
        .bind(domain)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        Ok(row.map(Into::into))
    }

    async fn list_by_domain(&self, domain: &str, tenant_id: &str, limit: i64) -> Result<Vec<MetadataRecord>> {
        let rows = sqlx::query_as::<_, MetadataRow>(
            "SELECT * FROM metadata_records WHERE domain = $1 AND tenant_id = $2 ORDER BY updated_at DESC LIMIT $3",
        )
        .bind(domain)
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryCatalogStore {
        records: Mutex<HashMap<(String, String), MetadataRecord>>,
    }

    impl InMemoryCatalogStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CatalogStore for InMemoryCatalogStore {
        async fn upsert_record(&self, mut record: MetadataRecord) -> Result<MetadataRecord> {
            let key = (record.domain.clone(), record.id.clone());
            let mut records = self.records.lock().unwrap();
            record.updated_at = Utc::now();
            if let Some(existing) = records.get(&key) {
                record.created_at = existing.created_at;
            } else {
                record.created_at = record.updated_at;
            }
            records.insert(key, record.clone());
            Ok(record)
        }

        async fn get_record(&self, domain: &str, id: &str) -> Result<Option<MetadataRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(domain.to_string(), id.to_string()))
                .cloned())
        }

        async fn list_by_domain(&self, domain: &str, tenant_id: &str, limit: i64) -> Result<Vec<MetadataRecord>> {
            let mut rows: Vec<MetadataRecord> = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.domain == domain && r.tenant_id == tenant_id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            rows.truncate(limit.max(0) as usize);
            Ok(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryCatalogStore;
    use super::*;
    use crate::model::dataset_identity;

    fn record(id: &str) -> MetadataRecord {
        MetadataRecord {
            domain: "catalog.dataset".into(),
            id: id.into(),
            tenant_id: "t1".into(),
            project_id: None,
            labels: vec!["warehouse".into()],
            payload: serde_json::json!({"table": "orders"}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_preserves_created_at_across_updates() {
        let store = InMemoryCatalogStore::new();
        let id = dataset_identity("t1", "src-1", None, "public", "orders");
        let first = store.upsert_record(record(&id)).await.unwrap();
        let second = store.upsert_record(record(&id)).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn list_by_domain_scopes_by_tenant() {
        let store = InMemoryCatalogStore::new();
        store.upsert_record(record("r1")).await.unwrap();
        let mut other = record("r2");
        other.tenant_id = "t2".into();
        store.upsert_record(other).await.unwrap();

        let rows = store.list_by_domain("catalog.dataset", "t1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "r1");
    }
}
