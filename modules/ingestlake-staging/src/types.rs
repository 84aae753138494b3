use chrono::{DateTime, Utc};
use ingestlake_connector::Record;
use serde::{Deserialize, Serialize};

/// Deterministic addressing root for a staging session's objects:
/// `ingestion/<workspace>/<endpoint>/<run>/<sliceIndex>` (spec §4.2).
#[derive(Debug, Clone)]
pub struct SessionKey {
    pub workspace: String,
    pub endpoint_id: String,
    pub run_id: String,
    pub slice_index: u32,
}

impl SessionKey {
    pub fn prefix(&self) -> String {
        format!(
            "ingestion/{}/{}/{}/{:05}",
            self.workspace, self.endpoint_id, self.run_id, self.slice_index
        )
    }

    pub fn batch_key(&self, batch_index: u32) -> String {
        format!("{}/{batch_index:05}.ndjson", self.prefix())
    }

    pub fn manifest_key(&self) -> String {
        format!("{}/_manifest.json", self.prefix())
    }

    pub fn success_marker_key(&self) -> String {
        format!("{}/_success", self.prefix())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub created_at: DateTime<Utc>,
    pub ttl_days: u32,
    pub batch_count: u32,
    pub finalized: bool,
}

impl SessionManifest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at).num_days() >= self.ttl_days as i64
    }
}

/// One batch of records as read back from staging.
pub type Batch = Vec<Record>;
