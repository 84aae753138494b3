use async_trait::async_trait;
use ingestlake_common::{IngestError, Result};
use sqlx::PgPool;

use crate::types::{KvEntry, KvKey};
use crate::{ExpectedVersion, KvStore};

/// Postgres-backed `KvStore`, matching the `kv_entries` table in spec §6.7.
#[derive(Clone)]
pub struct PostgresKvStore {
    pool: PgPool,
}

impl PostgresKvStore {
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

    async fn current_version(&self, key: &KvKey) -> Result<Option<i64>> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT version FROM kv_entries WHERE namespace = $1 AND scope_id = $2 AND key = $3",
        )
        .bind(&key.namespace)
        .bind(&key.scope_id)
        .bind(&key.key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        Ok(row.map(|(v,)| v))
    }
}

#[async_trait]
impl KvStore for PostgresKvStore {
    async fn get(&self, key: &KvKey) -> Result<Option<KvEntry>> {
        let row = sqlx::query_as::<_, KvEntryRow>(
            r#"
            SELECT value, version, updated_at
            FROM kv_entries
            WHERE namespace = $1 AND scope_id = $2 AND key = $3
            "#,
        )
        .bind(&key.namespace)
        .bind(&key.scope_id)
        .bind(&key.key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        Ok(row.map(Into::into))
    }

    async fn put(
        &self,
        key: &KvKey,
        value: serde_json::Value,
        expected_version: ExpectedVersion,
    ) -> Result<KvEntry> {
        match expected_version {
            None => {
                let inserted = sqlx::query_as::<_, KvEntryRow>(
                    r#"
                    INSERT INTO kv_entries (namespace, scope_id, key, value, version, updated_at)
                    VALUES ($1, $2, $3, $4, 1, now())
                    ON CONFLICT (namespace, scope_id, key) DO NOTHING
                    RETURNING value, version, updated_at
                    "#,
                )
                .bind(&key.namespace)
                .bind(&key.scope_id)
                .bind(&key.key)
                .bind(&value)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| IngestError::Other(e.into()))?;

                match inserted {
                    Some(row) => Ok(row.into()),
                    None => {
                        let actual = self.current_version(key).await?.unwrap_or(0);
                        Err(IngestError::CheckpointConflict { expected: 0, actual })
                    }
                }
            }
            Some(expected) => {
                let updated = sqlx::query_as::<_, KvEntryRow>(
                    r#"
                    UPDATE kv_entries
                    SET value = $4, version = version + 1, updated_at = now()
                    WHERE namespace = $1 AND scope_id = $2 AND key = $3 AND version = $5
                    RETURNING value, version, updated_at
                    "#,
                )
                .bind(&key.namespace)
                .bind(&key.scope_id)
                .bind(&key.key)
                .bind(&value)
                .bind(expected)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| IngestError::Other(e.into()))?;

                match updated {
                    Some(row) => Ok(row.into()),
                    None => {
                        let actual = self.current_version(key).await?.unwrap_or(0);
                        Err(IngestError::CheckpointConflict { expected, actual })
                    }
                }
            }
        }
    }

    async fn delete(&self, key: &KvKey) -> Result<()> {
        sqlx::query("DELETE FROM kv_entries WHERE namespace = $1 AND scope_id = $2 AND key = $3")
            .bind(&key.namespace)
            .bind(&key.scope_id)
            .bind(&key.key)
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::Other(e.into()))?;
        Ok(())
    }

    async fn list(&self, namespace: &str, scope_id: &str) -> Result<Vec<KvEntry>> {
        let rows = sqlx::query_as::<_, KvEntryRow>(
            r#"
            SELECT value, version, updated_at
            FROM kv_entries
            WHERE namespace = $1 AND scope_id = $2
            "#,
        )
        .bind(namespace)
        .bind(scope_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct KvEntryRow {
    value: serde_json::Value,
    version: i64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<KvEntryRow> for KvEntry {
    fn from(row: KvEntryRow) -> Self {
        KvEntry {
            value: row.value,
            version: row.version,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Skipped, not failed, when `DATABASE_TEST_URL` is unset.
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("DATABASE_TEST_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        let store = PostgresKvStore::new(pool.clone());
        store.migrate().await.ok()?;
        sqlx::query("TRUNCATE kv_entries").execute(&pool).await.ok()?;
        Some(pool)
    }

    #[tokio::test]
    async fn cas_put_rejects_stale_version() {
        let Some(pool) = test_pool().await else { return };
        let store = PostgresKvStore::new(pool);
        let key = KvKey::new("ingestion", "ep-1", "unit-1");

        store.put(&key, serde_json::json!({"cursor": 1}), None).await.unwrap();
        let err = store
            .put(&key, serde_json::json!({"cursor": 2}), Some(999))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::CheckpointConflict { .. }));

        let current = store.get(&key).await.unwrap().unwrap();
        assert_eq!(current.value["cursor"], 1);
    }

    #[tokio::test]
    async fn fresh_put_then_correct_version_bump_succeeds() {
        let Some(pool) = test_pool().await else { return };
        let store = PostgresKvStore::new(pool);
        let key = KvKey::new("ingestion", "ep-2", "unit-1");

        let first = store.put(&key, serde_json::json!({"cursor": 1}), None).await.unwrap();
        assert_eq!(first.version, 1);

        let second = store
            .put(&key, serde_json::json!({"cursor": 2}), Some(1))
            .await
            .unwrap();
        assert_eq!(second.version, 2);
    }
}
