use chrono::{DateTime, Utc};
use ingestlake_common::ids::{EndpointId, SinkId, UnitId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::unit::ResolvedPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Paused,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Skipped)
    }
}

/// `CollectionRun` (spec §3.1): the orchestrator's externally-visible run
/// record. `completed_at` is set iff `status.is_terminal()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRun {
    pub id: Uuid,
    pub endpoint_id: EndpointId,
    pub collection_id: Option<String>,
    pub status: RunStatus,
    pub requested_by: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub workflow_id: Option<String>,
    pub workflow_run_id: Option<String>,
    pub error: Option<String>,
    pub filters: serde_json::Value,
}

impl CollectionRun {
    pub fn queued(endpoint_id: EndpointId, requested_by: Option<String>, filters: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint_id,
            collection_id: None,
            status: RunStatus::Queued,
            requested_by,
            requested_at: Utc::now(),
            started_at: None,
            completed_at: None,
            workflow_id: None,
            workflow_run_id: None,
            error: None,
            filters,
        }
    }

    pub fn transition(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        if status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// Everything `start_ingestion_run` resolves up front and hands to every
/// later stage (spec §4.3 step 1).
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub workspace: String,
    pub endpoint_id: EndpointId,
    pub unit_id: UnitId,
    pub sink_id: SinkId,
    pub dataset_id: String,
    pub vendor_key: String,
    pub merged_policy: serde_json::Value,
    pub resolved_policy: ResolvedPolicy,
    pub cursor: Option<serde_json::Value>,
    pub transient_state: Option<serde_json::Value>,
    pub checkpoint_version: Option<i64>,
    pub transient_version: Option<i64>,
    pub cdm_model_id: Option<String>,
    pub tenant_id: String,
}
