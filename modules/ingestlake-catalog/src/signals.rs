//! `SignalDefinition`/`SignalInstance` persistence (spec §3.1, §6.7
//! `signal_definitions`/`signal_instances`). Evaluation itself — the DSL and
//! the reconciliation loop — lives in `ingestlake_signals`; this crate only
//! owns the durable store, the same split as `GraphStore`/`CatalogStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingestlake_common::{IngestError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DefinitionStatus {
    Active,
    Disabled,
    Draft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImplMode {
    Dsl,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
    Open,
    Resolved,
    Suppressed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDefinition {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub status: DefinitionStatus,
    pub impl_mode: ImplMode,
    pub source_family: Option<String>,
    pub entity_kind: Option<String>,
    pub process_kind: Option<String>,
    pub policy_kind: Option<String>,
    pub severity: Severity,
    pub tags: Vec<String>,
    pub cdm_model_id: Option<String>,
    pub surface_hints: serde_json::Value,
    pub owner: Option<String>,
    pub definition_spec: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalInstance {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub status: InstanceStatus,
    pub entity_ref: String,
    pub entity_kind: String,
    pub severity: Severity,
    pub summary: String,
    pub details: serde_json::Value,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub source_run_id: Option<String>,
}

/// What the evaluator knows after a DSL match, handed to the store to
/// upsert as OPEN (spec §4.5 step 3 "Matched ... upsert as OPEN").
#[derive(Debug, Clone)]
pub struct MatchedInstance {
    pub definition_id: Uuid,
    pub entity_ref: String,
    pub entity_kind: String,
    pub severity: Severity,
    pub summary: String,
    pub details: serde_json::Value,
    pub source_run_id: Option<String>,
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn list_definitions(&self, slugs: Option<&[String]>, only_active: bool) -> Result<Vec<SignalDefinition>>;

    /// Paged over `(definition_id)`, ordered by `entity_ref` for stable
    /// pagination (spec §4.5 step 1, MAX_PAGE_SIZE = 200 per page).
    async fn list_instances(&self, definition_id: Uuid, offset: i64, limit: i64) -> Result<Vec<SignalInstance>>;

    /// Upsert by `(definitionId, entityRef)`: insert OPEN with
    /// `firstSeenAt=lastSeenAt=now`, or on conflict refresh
    /// severity/summary/details/lastSeenAt, clear `resolvedAt`, and force
    /// status back to OPEN (spec §4.5 step 3). A SUPPRESSED row is left
    /// untouched by the caller — it never calls this for one.
    async fn upsert_matched(&self, matched: MatchedInstance) -> Result<SignalInstance>;

    /// No-op if the row isn't currently OPEN (spec §4.5 step 3 "Previously
    /// OPEN, not matched this run -> RESOLVED"; resolving twice must not
    /// re-bump `resolvedAt`).
    async fn resolve_instance(&self, definition_id: Uuid, entity_ref: &str, resolved_at: DateTime<Utc>) -> Result<()>;
}

#[derive(Clone)]
pub struct PostgresSignalStore {
    pool: sqlx::PgPool,
}

impl PostgresSignalStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DefinitionRow {
    id: Uuid,
    slug: String,
    title: String,
    status: String,
    impl_mode: String,
    source_family: Option<String>,
    entity_kind: Option<String>,
    process_kind: Option<String>,
    policy_kind: Option<String>,
    severity: String,
    tags: Vec<String>,
    cdm_model_id: Option<String>,
    surface_hints: serde_json::Value,
    owner: Option<String>,
    definition_spec: serde_json::Value,
}

fn parse_status(s: &str) -> Result<DefinitionStatus> {
    match s {
        "ACTIVE" => Ok(DefinitionStatus::Active),
        "DISABLED" => Ok(DefinitionStatus::Disabled),
        "DRAFT" => Ok(DefinitionStatus::Draft),
        other => Err(IngestError::Other(anyhow::anyhow!("unknown definition status '{other}'"))),
    }
}

fn parse_impl_mode(s: &str) -> Result<ImplMode> {
    match s {
        "DSL" => Ok(ImplMode::Dsl),
        "CODE" => Ok(ImplMode::Code),
        other => Err(IngestError::Other(anyhow::anyhow!("unknown impl mode '{other}'"))),
    }
}

fn parse_severity(s: &str) -> Result<Severity> {
    match s {
        "INFO" => Ok(Severity::Info),
        "WARNING" => Ok(Severity::Warning),
        "ERROR" => Ok(Severity::Error),
        "CRITICAL" => Ok(Severity::Critical),
        other => Err(IngestError::Other(anyhow::anyhow!("unknown severity '{other}'"))),
    }
}

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Info => "INFO",
        Severity::Warning => "WARNING",
        Severity::Error => "ERROR",
        Severity::Critical => "CRITICAL",
    }
}

impl TryFrom<DefinitionRow> for SignalDefinition {
    type Error = IngestError;

    fn try_from(row: DefinitionRow) -> Result<Self> {
        Ok(SignalDefinition {
            id: row.id,
            slug: row.slug,
            title: row.title,
            status: parse_status(&row.status)?,
            impl_mode: parse_impl_mode(&row.impl_mode)?,
            source_family: row.source_family,
            entity_kind: row.entity_kind,
            process_kind: row.process_kind,
            policy_kind: row.policy_kind,
            severity: parse_severity(&row.severity)?,
            tags: row.tags,
            cdm_model_id: row.cdm_model_id,
            surface_hints: row.surface_hints,
            owner: row.owner,
            definition_spec: row.definition_spec,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: Uuid,
    definition_id: Uuid,
    status: String,
    entity_ref: String,
    entity_kind: String,
    severity: String,
    summary: String,
    details: serde_json::Value,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    source_run_id: Option<String>,
}

fn parse_instance_status(s: &str) -> Result<InstanceStatus> {
    match s {
        "OPEN" => Ok(InstanceStatus::Open),
        "RESOLVED" => Ok(InstanceStatus::Resolved),
        "SUPPRESSED" => Ok(InstanceStatus::Suppressed),
        other => Err(IngestError::Other(anyhow::anyhow!("unknown instance status '{other}'"))),
    }
}

impl TryFrom<InstanceRow> for SignalInstance {
    type Error = IngestError;

    fn try_from(row: InstanceRow) -> Result<Self> {
        Ok(SignalInstance {
            id: row.id,
            definition_id: row.definition_id,
            status: parse_instance_status(&row.status)?,
            entity_ref: row.entity_ref,
            entity_kind: row.entity_kind,
            severity: parse_severity(&row.severity)?,
            summary: row.summary,
            details: row.details,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
            resolved_at: row.resolved_at,
            source_run_id: row.source_run_id,
        })
    }
}

#[async_trait]
impl SignalStore for PostgresSignalStore {
    async fn list_definitions(&self, slugs: Option<&[String]>, only_active: bool) -> Result<Vec<SignalDefinition>> {
        let rows = sqlx::query_as::<_, DefinitionRow>(
            r#"
            SELECT * FROM signal_definitions
            WHERE ($1::text[] IS NULL OR slug = ANY($1))
              AND ($2 = false OR status = 'ACTIVE')
            ORDER BY slug
            "#,
        )
        .bind(slugs)
        .bind(only_active)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        rows.into_iter().map(SignalDefinition::try_from).collect()
    }

    async fn list_instances(&self, definition_id: Uuid, offset: i64, limit: i64) -> Result<Vec<SignalInstance>> {
        let rows = sqlx::query_as::<_, InstanceRow>(
            "SELECT * FROM signal_instances WHERE definition_id = $1 ORDER BY entity_ref LIMIT $2 OFFSET $3",
        )
        .bind(definition_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        rows.into_iter().map(SignalInstance::try_from).collect()
    }

    async fn upsert_matched(&self, matched: MatchedInstance) -> Result<SignalInstance> {
        let row = sqlx::query_as::<_, InstanceRow>(
            r#"
            INSERT INTO signal_instances
                (definition_id, status, entity_ref, entity_kind, severity, summary, details, source_run_id)
            VALUES ($1, 'OPEN', $2, $3, $4, $5, $6, $7)
            ON CONFLICT (definition_id, entity_ref) DO UPDATE SET
                status = 'OPEN',
                severity = EXCLUDED.severity,
                summary = EXCLUDED.summary,
                details = EXCLUDED.details,
                source_run_id = EXCLUDED.source_run_id,
                last_seen_at = now(),
                resolved_at = NULL
            RETURNING *
            "#,
        )
        .bind(matched.definition_id)
        .bind(&matched.entity_ref)
        .bind(&matched.entity_kind)
        .bind(severity_str(matched.severity))
        .bind(&matched.summary)
        .bind(&matched.details)
        .bind(&matched.source_run_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        SignalInstance::try_from(row)
    }

    async fn resolve_instance(&self, definition_id: Uuid, entity_ref: &str, resolved_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE signal_instances SET status = 'RESOLVED', resolved_at = $3 WHERE definition_id = $1 AND entity_ref = $2 AND status = 'OPEN'",
        )
        .bind(definition_id)
        .bind(entity_ref)
        .bind(resolved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Other(e.into()))?;
        Ok(())
    }
}

pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use uuid::Uuid;

    use super::*;

    #[derive(Default)]
    pub struct InMemorySignalStore {
        definitions: Mutex<HashMap<Uuid, SignalDefinition>>,
        instances: Mutex<HashMap<(Uuid, String), SignalInstance>>,
    }

    impl InMemorySignalStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_definition(&self, definition: SignalDefinition) {
            self.definitions.lock().unwrap().insert(definition.id, definition);
        }

        /// Test/ops hook: force a row to SUPPRESSED, as an external actor
        /// would via the UI (spec §3.2 "external actors may transition
        /// OPEN->SUPPRESSED").
        pub fn suppress(&self, definition_id: Uuid, entity_ref: &str) {
            if let Some(instance) = self.instances.lock().unwrap().get_mut(&(definition_id, entity_ref.to_string())) {
                instance.status = InstanceStatus::Suppressed;
            }
        }
    }

    #[async_trait]
    impl SignalStore for InMemorySignalStore {
        async fn list_definitions(&self, slugs: Option<&[String]>, only_active: bool) -> Result<Vec<SignalDefinition>> {
            let mut rows: Vec<SignalDefinition> = self
                .definitions
                .lock()
                .unwrap()
                .values()
                .filter(|d| slugs.map(|s| s.contains(&d.slug)).unwrap_or(true))
                .filter(|d| !only_active || d.status == DefinitionStatus::Active)
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.slug.cmp(&b.slug));
            Ok(rows)
        }

        async fn list_instances(&self, definition_id: Uuid, offset: i64, limit: i64) -> Result<Vec<SignalInstance>> {
            let mut rows: Vec<SignalInstance> = self
                .instances
                .lock()
                .unwrap()
                .values()
                .filter(|i| i.definition_id == definition_id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.entity_ref.cmp(&b.entity_ref));
            let start = offset.max(0) as usize;
            let end = start.saturating_add(limit.max(0) as usize);
            Ok(rows.into_iter().skip(start).take(end - start).collect())
        }

        async fn upsert_matched(&self, matched: MatchedInstance) -> Result<SignalInstance> {
            let mut instances = self.instances.lock().unwrap();
            let key = (matched.definition_id, matched.entity_ref.clone());
            let now = Utc::now();
            let instance = match instances.get(&key) {
                Some(existing) => SignalInstance {
                    id: existing.id,
                    definition_id: matched.definition_id,
                    status: InstanceStatus::Open,
                    entity_ref: matched.entity_ref,
                    entity_kind: matched.entity_kind,
                    severity: matched.severity,
                    summary: matched.summary,
                    details: matched.details,
                    first_seen_at: existing.first_seen_at,
                    last_seen_at: now,
                    resolved_at: None,
                    source_run_id: matched.source_run_id,
                },
                None => SignalInstance {
                    id: Uuid::new_v4(),
                    definition_id: matched.definition_id,
                    status: InstanceStatus::Open,
                    entity_ref: matched.entity_ref,
                    entity_kind: matched.entity_kind,
                    severity: matched.severity,
                    summary: matched.summary,
                    details: matched.details,
                    first_seen_at: now,
                    last_seen_at: now,
                    resolved_at: None,
                    source_run_id: matched.source_run_id,
                },
            };
            instances.insert(key, instance.clone());
            Ok(instance)
        }

        async fn resolve_instance(&self, definition_id: Uuid, entity_ref: &str, resolved_at: DateTime<Utc>) -> Result<()> {
            let mut instances = self.instances.lock().unwrap();
            if let Some(instance) = instances.get_mut(&(definition_id, entity_ref.to_string())) {
                if instance.status == InstanceStatus::Open {
                    instance.status = InstanceStatus::Resolved;
                    instance.resolved_at = Some(resolved_at);
                }
            }
            Ok(())
        }
    }
}
