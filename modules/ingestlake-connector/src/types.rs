use std::collections::BTreeMap;

use ingestlake_common::ids::{EndpointId, TemplateId};
use serde::{Deserialize, Serialize};

/// A single staged/sourced row. String-keyed, with an optional `_raw` slot
/// retaining the upstream payload verbatim for CDM mapping (spec §4.1).
pub type Record = BTreeMap<String, serde_json::Value>;

pub const RAW_SLOT: &str = "_raw";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub template_id: TemplateId,
    pub project_id: Option<String>,
    pub domain: Option<String>,
    pub source_id: Option<String>,
    pub name: String,
    pub url: String,
    pub verb: Option<String>,
    pub auth_policy: serde_json::Value,
    pub labels: Vec<String>,
    pub config: serde_json::Value,
    pub detected_version: Option<String>,
    pub capabilities: Vec<String>,
    pub delegated_connected: Option<bool>,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Endpoint {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FieldValueType {
    String,
    Number,
    Boolean,
    Json,
    Enum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub key: String,
    pub value_type: FieldValueType,
    pub required: bool,
    pub sensitive: bool,
    pub semantic: Option<String>,
    pub depends_on: Option<String>,
    pub regex: Option<String>,
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointTemplate {
    pub id: TemplateId,
    pub family: String,
    pub title: String,
    pub vendor: String,
    pub domain: String,
    pub categories: Vec<String>,
    pub protocols: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
    pub capabilities: Vec<String>,
    pub connection: serde_json::Value,
    pub probing: serde_json::Value,
    pub ingestion_units: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slice {
    pub slice_id: String,
    pub sequence: u32,
    pub params: serde_json::Value,
    pub estimated_rows: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateConfigResult {
    pub valid: bool,
    pub message: Option<String>,
    pub detected_version: Option<String>,
}

impl ValidateConfigResult {
    pub fn ok() -> Self {
        Self { valid: true, message: None, detected_version: None }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self { valid: false, message: Some(message.into()), detected_version: None }
    }
}
