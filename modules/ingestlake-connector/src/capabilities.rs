use async_trait::async_trait;
use ingestlake_common::Result;
use serde::{Deserialize, Serialize};

use crate::iterator::RecordIterator;
use crate::types::{Dataset, Record, Slice, ValidateConfigResult};

/// Every connector implements this. Capability traits below are opt-in:
/// a connector advertises one by overriding the matching `Connector::as_*`
/// accessor to return `Some(self)` instead of the default `None` (spec
/// §4.1 "Registry contract", capability discovery via dynamic type-test —
/// expressed here as explicit downcast accessors since Rust trait objects
/// don't support runtime type-test directly).
#[async_trait]
pub trait Connector: Send + Sync {
    fn template_id(&self) -> &str;

    async fn validate_config(&self, config: &serde_json::Value) -> ValidateConfigResult;

    fn as_source(&self) -> Option<&dyn SourceEndpoint> {
        None
    }

    fn as_slice_capable(&self) -> Option<&dyn SliceCapable> {
        None
    }

    fn as_adaptive(&self) -> Option<&dyn AdaptiveIngestion> {
        None
    }

    fn as_metadata_capable(&self) -> Option<&dyn MetadataCapable> {
        None
    }

    fn as_sink(&self) -> Option<&dyn SinkEndpoint> {
        None
    }

    fn as_action(&self) -> Option<&dyn ActionEndpoint> {
        None
    }
}

#[async_trait]
pub trait SourceEndpoint: Send + Sync {
    async fn list_datasets(&self) -> Result<Vec<Dataset>>;

    async fn get_schema(&self, dataset_id: &str) -> Result<serde_json::Value>;

    async fn read(
        &self,
        dataset_id: &str,
        slice: Option<&Slice>,
        limit: Option<u64>,
    ) -> Result<Box<dyn RecordIterator>>;
}

#[async_trait]
pub trait SliceCapable: Send + Sync {
    async fn get_checkpoint(&self, dataset_id: &str) -> Result<Option<serde_json::Value>>;

    async fn plan_slices(
        &self,
        dataset_id: &str,
        checkpoint: Option<&serde_json::Value>,
        target_size: u64,
    ) -> Result<Vec<Slice>>;

    async fn read_slice(&self, dataset_id: &str, slice: &Slice) -> Result<Box<dyn RecordIterator>>;

    async fn count_between(&self, dataset_id: &str, lower: &serde_json::Value, upper: &serde_json::Value) -> Result<u64>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub estimated_count: Option<u64>,
    pub estimated_bytes: Option<u64>,
    pub slice_keys: Vec<String>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionPlan {
    pub slices: Vec<Slice>,
    pub strategy: String,
}

#[async_trait]
pub trait AdaptiveIngestion: Send + Sync {
    async fn probe_ingestion(&self, dataset_id: &str, config: &serde_json::Value) -> Result<ProbeResult>;

    /// Deterministic given the same probe result and config.
    async fn plan_ingestion(&self, probe: &ProbeResult, config: &serde_json::Value) -> Result<IngestionPlan>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub detected_version: Option<String>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub datasets: Vec<Dataset>,
}

#[async_trait]
pub trait MetadataCapable: Send + Sync {
    async fn probe_environment(&self, config: &serde_json::Value) -> Result<Environment>;

    async fn collect_metadata(&self, env: &Environment) -> Result<CatalogSnapshot>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkStats {
    pub records_written: u64,
    pub batches_written: u64,
}

#[async_trait]
pub trait SinkEndpoint: Send + Sync {
    async fn begin(&self, ctx: &serde_json::Value) -> Result<()>;

    async fn write_batch(&self, records: &[Record], ctx: &serde_json::Value) -> Result<()>;

    async fn commit(&self, ctx: &serde_json::Value, stats: Option<&SinkStats>) -> Result<()>;

    /// Model ids this sink accepts in `mode=cdm`. Supports exact match or a
    /// prefix wildcard like `cdm.work.*` (spec §4.3 step 1).
    fn supported_cdm_models(&self) -> &[String];
}

pub fn cdm_model_supported(supported: &[String], model_id: &str) -> bool {
    supported.iter().any(|pattern| {
        if let Some(prefix) = pattern.strip_suffix('*') {
            model_id.starts_with(prefix)
        } else {
            pattern == model_id
        }
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub id: String,
    pub title: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_id: String,
    pub params: serde_json::Value,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub ok: bool,
    pub details: serde_json::Value,
}

#[async_trait]
pub trait ActionEndpoint: Send + Sync {
    async fn list_actions(&self) -> Result<Vec<ActionDescriptor>>;

    async fn get_action_schema(&self, id: &str) -> Result<Option<serde_json::Value>>;

    async fn execute_action(&self, req: ActionRequest) -> Result<ActionResult>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub relation_type: String,
    pub target_logical_key: String,
    pub confidence: f32,
}

pub trait RelationExtractor: Send + Sync {
    fn extract_relations(&self, record: &Record) -> Vec<Relation>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub entity_kind: String,
    pub text: String,
    pub confidence: f32,
}

pub trait MentionExtractor: Send + Sync {
    fn extract_mentions(&self, record: &Record) -> Vec<Mention>;
}
