use ingestlake_common::ids::{EndpointId, SinkId, UnitId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    Raw,
    Cdm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Manual,
    Interval,
    Cron,
}

/// Per-unit ingestion configuration (spec §3.1 `IngestionUnitConfig`).
///
/// `sink_endpoint_id` is retained only for config-shape compatibility with
/// the source system (Open Question resolution, SPEC_FULL.md §D.1): the
/// orchestrator resolves sinks exclusively via `sink_id` against the
/// process-wide `ConnectorRegistry` and logs a warning if
/// `sink_endpoint_id` is set without a matching `sink_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionUnitConfig {
    pub endpoint_id: EndpointId,
    pub unit_id: UnitId,
    pub dataset_id: String,
    pub enabled: bool,
    pub run_mode: RunMode,
    pub mode: IngestMode,
    pub sink_id: Option<SinkId>,
    /// Ignored; retained for config-shape compatibility only. Sink
    /// resolution is `sink_id`-only.
    #[serde(default)]
    pub sink_endpoint_id: Option<String>,
    pub schedule_kind: ScheduleKind,
    pub schedule_interval_minutes: Option<u32>,
    pub policy: serde_json::Value,
    pub filter: serde_json::Value,
    /// Required when `mode=cdm` (spec §3.1 invariant).
    pub cdm_model_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitRunState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Paused,
}

/// `(endpointId, unitId, sinkId)`-scoped run state (spec §3.1
/// `IngestionUnitState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionUnitState {
    pub endpoint_id: EndpointId,
    pub unit_id: UnitId,
    pub sink_id: SinkId,
    pub state: UnitRunState,
    pub last_run_id: Option<String>,
    pub last_run_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
    pub stats: serde_json::Value,
    pub checkpoint: serde_json::Value,
}

impl IngestionUnitState {
    pub fn idle(endpoint_id: EndpointId, unit_id: UnitId, sink_id: SinkId) -> Self {
        Self {
            endpoint_id,
            unit_id,
            sink_id,
            state: UnitRunState::Idle,
            last_run_id: None,
            last_run_at: None,
            last_error: None,
            stats: serde_json::json!({}),
            checkpoint: serde_json::json!({}),
        }
    }
}

/// Resolved policy knobs (spec §4.3 step 1 merge order: endpoint base
/// `ingestionPolicy` is overridden by the unit's `config.policy`, then
/// endpoint-level `parameters` fill in only keys absent from the merge).
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPolicy {
    pub max_parallel_slices: u32,
    pub fetch_size: u32,
    pub reset: bool,
    pub cancel_siblings_on_failure: bool,
}

impl Default for ResolvedPolicy {
    fn default() -> Self {
        Self {
            max_parallel_slices: 1,
            fetch_size: 500,
            reset: false,
            cancel_siblings_on_failure: true,
        }
    }
}

/// Merge base policy, overrides, and endpoint parameters into one JSON
/// object, then extract the typed knobs the orchestrator acts on.
pub fn merge_policy(
    base: &serde_json::Value,
    overrides: &serde_json::Value,
    endpoint_parameters: &serde_json::Value,
) -> (serde_json::Value, ResolvedPolicy) {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    if let Some(over) = overrides.as_object() {
        for (k, v) in over {
            merged.insert(k.clone(), v.clone());
        }
    }
    if let Some(params) = endpoint_parameters.as_object() {
        for (k, v) in params {
            merged.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    let defaults = ResolvedPolicy::default();
    let resolved = ResolvedPolicy {
        max_parallel_slices: merged
            .get("maxParallelSlices")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(defaults.max_parallel_slices),
        fetch_size: merged
            .get("fetchSize")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(defaults.fetch_size),
        reset: merged.get("reset").and_then(|v| v.as_bool()).unwrap_or(defaults.reset),
        cancel_siblings_on_failure: merged
            .get("cancelSiblingsOnFailure")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.cancel_siblings_on_failure),
    };
    (serde_json::Value::Object(merged), resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overrides_win_over_base() {
        let base = json!({"maxParallelSlices": 1, "fetchSize": 100});
        let overrides = json!({"maxParallelSlices": 4});
        let (_, resolved) = merge_policy(&base, &overrides, &json!({}));
        assert_eq!(resolved.max_parallel_slices, 4);
        assert_eq!(resolved.fetch_size, 100);
    }

    #[test]
    fn endpoint_parameters_only_fill_absent_keys() {
        let base = json!({"fetchSize": 100});
        let overrides = json!({});
        let endpoint_params = json!({"fetchSize": 999, "reset": true});
        let (merged, resolved) = merge_policy(&base, &overrides, &endpoint_params);
        assert_eq!(resolved.fetch_size, 100);
        assert_eq!(resolved.reset, true);
        assert_eq!(merged["fetchSize"], 100);
    }

    #[test]
    fn defaults_apply_when_nothing_set() {
        let (_, resolved) = merge_policy(&json!({}), &json!({}), &json!({}));
        assert_eq!(resolved.max_parallel_slices, 1);
        assert!(resolved.cancel_siblings_on_failure);
    }
}
