use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EndpointId;

/// `{endpointId, ts, canonicalPath}` — appended to a `GraphNode`/
/// `GraphEdge`'s provenance list on every write that touches it (spec §3.2,
/// §4.6). Serialized as JSON in the store; never a native column
/// (Open Question resolution, SPEC_FULL.md §D.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub endpoint_id: EndpointId,
    pub ts: DateTime<Utc>,
    pub canonical_path: String,
}

/// Severity levels shared by endpoint templates' capability metadata and
/// by the signal evaluator (spec §3.1 `SignalDefinition.severity`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}
