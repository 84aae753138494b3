use std::sync::Arc;

use ingestlake_catalog::GraphStore;
use ingestlake_cdm::MapperRegistry;
use ingestlake_common::{truncate_error_message, IngestError, Result};
use ingestlake_connector::{cdm_model_supported, ConnectorRegistry, Endpoint};
use ingestlake_engine::{Engine, InMemoryEventLog};
use ingestlake_kv::{ExpectedVersion, KvKey, KvStore};
use ingestlake_objectstore::ObjectStore;
use uuid::Uuid;

use crate::budget::SliceBudget;
use crate::events::{RunDeps, RunEvent, RunReducer, RunRouter, RunState};
use crate::run::{CollectionRun, RunContext, RunStatus};
use crate::unit::{merge_policy, IngestMode, IngestionUnitConfig, IngestionUnitState, RunMode, ScheduleKind, UnitRunState};

/// Drives the ingestion run lifecycle (spec §4.3). Owns the shared,
/// process-wide stores and registry; each run gets its own `RunContext`
/// and `RunDeps`.
pub struct Orchestrator {
    pub kv: Arc<dyn KvStore>,
    pub graph: Arc<dyn GraphStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub connectors: Arc<ConnectorRegistry>,
    pub mappers: Arc<MapperRegistry>,
    pub workspace: String,
}

/// Outcome of a full `start -> ... -> complete|fail` run, for callers that
/// want both the unit state transition and the aggregated stats.
pub struct RunOutcome {
    pub unit_state: IngestionUnitState,
    pub run_state: RunState,
}

impl Orchestrator {
    pub fn new(
        kv: Arc<dyn KvStore>,
        graph: Arc<dyn GraphStore>,
        object_store: Arc<dyn ObjectStore>,
        connectors: Arc<ConnectorRegistry>,
        mappers: Arc<MapperRegistry>,
        workspace: impl Into<String>,
    ) -> Self {
        Self { kv, graph, object_store, connectors, mappers, workspace: workspace.into() }
    }

    /// `prepareCollectionJob` skip semantics (spec §4.3 "Skip semantics",
    /// §8 "Capability gate"): if the endpoint declares a non-empty
    /// capability list that excludes `metadata`, the run transitions
    /// directly to SKIPPED, never FAILED.
    pub fn prepare_collection_job(&self, endpoint: &Endpoint) -> CollectionRun {
        let mut run = CollectionRun::queued(endpoint.id.clone(), None, serde_json::json!({}));
        if !endpoint.capabilities.is_empty() && !endpoint.capabilities.iter().any(|c| c == "metadata") {
            run.transition(RunStatus::Skipped, Some("endpoint does not advertise `metadata` capability".into()));
        }
        run
    }

    /// spec §4.3 step 1.
    pub async fn start_ingestion_run(&self, endpoint: &Endpoint, unit: &IngestionUnitConfig, tenant_id: &str) -> Result<RunContext> {
        if !unit.enabled {
            return Err(IngestError::ConfigInvalid(format!("unit '{}' is disabled", unit.unit_id)));
        }
        let sink_id = unit.sink_id.clone().ok_or_else(|| IngestError::ConfigInvalid("no sinkId configured for unit".into()))?;

        if unit.sink_endpoint_id.is_some() {
            tracing::warn!(unit_id = %unit.unit_id, "sinkEndpointId is set but ignored; sink resolution is sinkId-only");
        }

        if !self.connectors.is_registered(sink_id.as_str()) {
            return Err(IngestError::ConfigInvalid(format!("sink '{sink_id}' is not registered")));
        }

        let cdm_model_id = if unit.mode == IngestMode::Cdm {
            let model_id = unit
                .cdm_model_id
                .clone()
                .ok_or_else(|| IngestError::ConfigInvalid("mode=cdm requires cdmModelId".into()))?;
            let sink = self.connectors.build(sink_id.as_str(), &serde_json::json!({}))?;
            let sink_endpoint = sink
                .as_sink()
                .ok_or_else(|| IngestError::CapabilityMissing(format!("sink '{sink_id}' does not advertise SinkEndpoint")))?;
            if !cdm_model_supported(sink_endpoint.supported_cdm_models(), &model_id) {
                return Err(IngestError::ConfigInvalid(format!(
                    "sink '{sink_id}' does not accept cdm model '{model_id}'"
                )));
            }
            Some(model_id)
        } else {
            None
        };

        let base_policy = endpoint.config.get("ingestionPolicy").cloned().unwrap_or_else(|| serde_json::json!({}));
        let endpoint_parameters = endpoint.config.get("parameters").cloned().unwrap_or_else(|| serde_json::json!({}));
        let (merged_policy, resolved_policy) = merge_policy(&base_policy, &unit.policy, &endpoint_parameters);

        let vendor_key = endpoint
            .domain
            .clone()
            .or_else(|| endpoint.source_id.clone())
            .unwrap_or_else(|| endpoint.id.to_string());

        let (cursor, transient_state, checkpoint_version, transient_version) = if resolved_policy.reset {
            (None, None, None, None)
        } else {
            let checkpoint_key = KvKey::ingestion(endpoint.id.as_str(), unit.unit_id.as_str(), Some(sink_id.as_str()), &vendor_key);
            let transient_key = KvKey::transient_state(endpoint.id.as_str(), unit.unit_id.as_str(), Some(sink_id.as_str()), &vendor_key);

            let checkpoint_entry = self.kv.get(&checkpoint_key).await?;
            let transient_entry = self.kv.get(&transient_key).await?;

            (
                checkpoint_entry.as_ref().and_then(|e| e.value.get("cursor").cloned()),
                transient_entry.as_ref().map(|e| e.value.clone()),
                checkpoint_entry.map(|e| e.version),
                transient_entry.map(|e| e.version),
            )
        };

        Ok(RunContext {
            run_id: Uuid::new_v4().to_string(),
            workspace: self.workspace.clone(),
            endpoint_id: endpoint.id.clone(),
            unit_id: unit.unit_id.clone(),
            sink_id,
            dataset_id: unit.dataset_id.clone(),
            vendor_key,
            merged_policy,
            resolved_policy,
            cursor,
            transient_state,
            checkpoint_version,
            transient_version,
            cdm_model_id,
            tenant_id: tenant_id.to_string(),
        })
    }

    /// Runs the probe/plan/slice/persist pipeline via `ingestlake_engine`,
    /// then commits the checkpoint (success path) or preserves it (failure
    /// path). Returns the final `IngestionUnitState`.
    pub async fn run(&self, ctx: RunContext, deps_without_ctx: RunDepsInput) -> Result<RunOutcome> {
        let deps = RunDeps {
            source: deps_without_ctx.source,
            sink: deps_without_ctx.sink,
            object_store: self.object_store.clone(),
            graph: self.graph.clone(),
            mappers: self.mappers.clone(),
            budget: Arc::new(SliceBudget::new(ctx.resolved_policy.max_parallel_slices)),
            ctx: ctx.clone(),
        };

        let log = InMemoryEventLog::new();
        let engine = Engine::new(RunReducer, RunRouter, log, ctx.run_id.clone());
        let mut state = RunState::default();

        match engine.dispatch(RunEvent::Started, &mut state, &deps).await {
            Ok(()) => {
                let unit_state = self.complete_ingestion_run(&ctx, &state).await?;
                Ok(RunOutcome { unit_state, run_state: state })
            }
            Err(err) => {
                let unit_state = self.fail_ingestion_run(&ctx, &err).await?;
                Err(IngestError::Other(anyhow::anyhow!("{err}; unit transitioned to {:?}", unit_state.state)))
            }
        }
    }

    /// spec §4.3 step 5: commit the checkpoint via CAS; on mismatch the
    /// run fails with `CHECKPOINT_CONFLICT` (spec §8 "Checkpoint CAS").
    async fn complete_ingestion_run(&self, ctx: &RunContext, state: &RunState) -> Result<IngestionUnitState> {
        let checkpoint_key = KvKey::ingestion(ctx.endpoint_id.as_str(), ctx.unit_id.as_str(), Some(ctx.sink_id.as_str()), &ctx.vendor_key);
        let transient_key =
            KvKey::transient_state(ctx.endpoint_id.as_str(), ctx.unit_id.as_str(), Some(ctx.sink_id.as_str()), &ctx.vendor_key);

        let new_cursor = state
            .slice_outcomes
            .iter()
            .rev()
            .find_map(|o| o.new_checkpoint.clone())
            .or_else(|| ctx.cursor.clone());

        let checkpoint_value = serde_json::json!({
            "cursor": new_cursor,
            "lastRunId": ctx.run_id,
            "stats": {
                "planMetadata": { "strategy": state.plan_strategy, "sliceCount": state.planned_slice_count },
                "slices": state.slice_outcomes,
                "persist": state.persist_stats,
            },
        });
        let expected: ExpectedVersion = ctx.checkpoint_version;
        self.kv.put(&checkpoint_key, checkpoint_value.clone(), expected).await?;

        if let Some(outcome) = state.slice_outcomes.iter().find_map(|o| o.transient_state.clone()) {
            let expected_transient: ExpectedVersion = ctx.transient_version;
            self.kv.put(&transient_key, outcome, expected_transient).await?;
        }

        Ok(IngestionUnitState {
            endpoint_id: ctx.endpoint_id.clone(),
            unit_id: ctx.unit_id.clone(),
            sink_id: ctx.sink_id.clone(),
            state: UnitRunState::Succeeded,
            last_run_id: Some(ctx.run_id.clone()),
            last_run_at: Some(chrono::Utc::now()),
            last_error: None,
            stats: checkpoint_value["stats"].clone(),
            checkpoint: checkpoint_value,
        })
    }

    /// spec §4.3 step 6: checkpoint is updated with `{lastRunId,
    /// lastError}` but the cursor is never cleared, so the next run
    /// resumes at the last known-good point.
    async fn fail_ingestion_run(&self, ctx: &RunContext, err: &IngestError) -> Result<IngestionUnitState> {
        let checkpoint_key = KvKey::ingestion(ctx.endpoint_id.as_str(), ctx.unit_id.as_str(), Some(ctx.sink_id.as_str()), &ctx.vendor_key);
        let truncated = truncate_error_message(&err.to_string());

        let checkpoint_value = serde_json::json!({
            "cursor": ctx.cursor,
            "lastRunId": ctx.run_id,
            "lastError": truncated,
        });

        // Preserve cursor even if the CAS itself conflicts: a second
        // conflict here is a best-effort log, not a hard failure, since
        // the run is already terminal.
        if let Err(cas_err) = self.kv.put(&checkpoint_key, checkpoint_value.clone(), ctx.checkpoint_version).await {
            tracing::warn!(run_id = %ctx.run_id, error = %cas_err, "checkpoint CAS conflict while recording failure");
        }

        Ok(IngestionUnitState {
            endpoint_id: ctx.endpoint_id.clone(),
            unit_id: ctx.unit_id.clone(),
            sink_id: ctx.sink_id.clone(),
            state: UnitRunState::Failed,
            last_run_id: Some(ctx.run_id.clone()),
            last_run_at: Some(chrono::Utc::now()),
            last_error: Some(truncated),
            stats: serde_json::json!({}),
            checkpoint: checkpoint_value,
        })
    }
}

/// Caller-resolved connectors for one run: the source the unit's endpoint
/// builds, and the sink `start_ingestion_run` already validated exists.
pub struct RunDepsInput {
    pub source: Arc<dyn ingestlake_connector::Connector>,
    pub sink: Arc<dyn ingestlake_connector::Connector>,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use ingestlake_catalog::store::memory::InMemoryGraphStore;
    use ingestlake_connector::{Connector, Dataset, Record, RecordIterator, SinkStats, Slice, SourceEndpoint, ValidateConfigResult, VecRecordIterator};
    use ingestlake_kv::InMemoryKvStore;
    use ingestlake_objectstore::LocalFsObjectStore;

    use super::*;

    fn endpoint(capabilities: Vec<String>) -> Endpoint {
        Endpoint {
            id: "ep-1".into(),
            template_id: "http.jira".into(),
            project_id: None,
            domain: Some("jira".into()),
            source_id: None,
            name: "Jira".into(),
            url: "https://jira.example.com".into(),
            verb: None,
            auth_policy: serde_json::json!({}),
            labels: vec![],
            config: serde_json::json!({}),
            detected_version: None,
            capabilities,
            delegated_connected: None,
            deleted_at: None,
        }
    }

    fn unit_config() -> IngestionUnitConfig {
        IngestionUnitConfig {
            endpoint_id: "ep-1".into(),
            unit_id: "jira.issues".into(),
            dataset_id: "jira.issues".into(),
            enabled: true,
            run_mode: RunMode::Incremental,
            mode: IngestMode::Raw,
            sink_id: Some("test.sink".into()),
            sink_endpoint_id: None,
            schedule_kind: ScheduleKind::Manual,
            schedule_interval_minutes: None,
            policy: serde_json::json!({}),
            filter: serde_json::json!({}),
            cdm_model_id: None,
        }
    }

    fn record(n: i64) -> Record {
        let mut r = Record::new();
        r.insert("n".into(), serde_json::json!(n));
        r
    }

    struct StubSource {
        records: Vec<Record>,
    }

    #[async_trait]
    impl Connector for StubSource {
        fn template_id(&self) -> &str {
            "http.jira"
        }

        async fn validate_config(&self, _config: &serde_json::Value) -> ValidateConfigResult {
            ValidateConfigResult::ok()
        }

        fn as_source(&self) -> Option<&dyn SourceEndpoint> {
            Some(self)
        }
    }

    #[async_trait]
    impl SourceEndpoint for StubSource {
        async fn list_datasets(&self) -> Result<Vec<Dataset>> {
            Ok(vec![])
        }

        async fn get_schema(&self, _dataset_id: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }

        async fn read(&self, _dataset_id: &str, _slice: Option<&Slice>, _limit: Option<u64>) -> Result<Box<dyn RecordIterator>> {
            Ok(Box::new(VecRecordIterator::new(self.records.clone())))
        }
    }

    struct FailingIterator;

    #[async_trait]
    impl RecordIterator for FailingIterator {
        async fn next(&mut self) -> Result<Option<Record>> {
            Err(IngestError::TransportFatal("connection reset".into()))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl Connector for FailingSource {
        fn template_id(&self) -> &str {
            "http.jira"
        }

        async fn validate_config(&self, _config: &serde_json::Value) -> ValidateConfigResult {
            ValidateConfigResult::ok()
        }

        fn as_source(&self) -> Option<&dyn SourceEndpoint> {
            Some(self)
        }
    }

    #[async_trait]
    impl SourceEndpoint for FailingSource {
        async fn list_datasets(&self) -> Result<Vec<Dataset>> {
            Ok(vec![])
        }

        async fn get_schema(&self, _dataset_id: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }

        async fn read(&self, _dataset_id: &str, _slice: Option<&Slice>, _limit: Option<u64>) -> Result<Box<dyn RecordIterator>> {
            Ok(Box::new(FailingIterator))
        }
    }

    struct StubSink {
        written: Mutex<Vec<Record>>,
    }

    #[async_trait]
    impl Connector for StubSink {
        fn template_id(&self) -> &str {
            "test.sink"
        }

        async fn validate_config(&self, _config: &serde_json::Value) -> ValidateConfigResult {
            ValidateConfigResult::ok()
        }

        fn as_sink(&self) -> Option<&dyn ingestlake_connector::SinkEndpoint> {
            Some(self)
        }
    }

    #[async_trait]
    impl ingestlake_connector::SinkEndpoint for StubSink {
        async fn begin(&self, _ctx: &serde_json::Value) -> Result<()> {
            Ok(())
        }

        async fn write_batch(&self, records: &[Record], _ctx: &serde_json::Value) -> Result<()> {
            self.written.lock().unwrap().extend_from_slice(records);
            Ok(())
        }

        async fn commit(&self, _ctx: &serde_json::Value, _stats: Option<&SinkStats>) -> Result<()> {
            Ok(())
        }

        fn supported_cdm_models(&self) -> &[String] {
            &[]
        }
    }

    fn test_orchestrator(registry: ConnectorRegistry) -> (Orchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryKvStore::new()),
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(LocalFsObjectStore::new(dir.path())),
            Arc::new(registry),
            Arc::new(MapperRegistry::new()),
            "ws1",
        );
        (orchestrator, dir)
    }

    #[test]
    fn capability_gate_skips_when_metadata_not_advertised() {
        let registry = ConnectorRegistry::new();
        let (orchestrator, _dir) = test_orchestrator(registry);
        let run = orchestrator.prepare_collection_job(&endpoint(vec!["ingest".into()]));
        assert_eq!(run.status, RunStatus::Skipped);
    }

    #[test]
    fn capability_gate_allows_empty_capability_list() {
        let registry = ConnectorRegistry::new();
        let (orchestrator, _dir) = test_orchestrator(registry);
        let run = orchestrator.prepare_collection_job(&endpoint(vec![]));
        assert_eq!(run.status, RunStatus::Queued);
    }

    #[tokio::test]
    async fn happy_path_run_writes_records_and_marks_unit_succeeded() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            "test.sink",
            Box::new(|_cfg| Ok(Arc::new(StubSink { written: Mutex::new(vec![]) }) as Arc<dyn Connector>)),
        );
        let (orchestrator, _dir) = test_orchestrator(registry);

        let ep = endpoint(vec![]);
        let unit = unit_config();
        let ctx = orchestrator.start_ingestion_run(&ep, &unit, "t1").await.unwrap();

        let source: Arc<dyn Connector> = Arc::new(StubSource { records: vec![record(1), record(2)] });
        let sink = orchestrator.connectors.build("test.sink", &serde_json::json!({})).unwrap();

        let outcome = orchestrator.run(ctx, RunDepsInput { source, sink }).await.unwrap();
        assert_eq!(outcome.unit_state.state, UnitRunState::Succeeded);
        assert_eq!(outcome.run_state.persist_stats.unwrap().records_written, 2);
    }

    #[tokio::test]
    async fn checkpoint_preserving_failure_keeps_cursor_for_next_run() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            "test.sink",
            Box::new(|_cfg| Ok(Arc::new(StubSink { written: Mutex::new(vec![]) }) as Arc<dyn Connector>)),
        );
        let (orchestrator, _dir) = test_orchestrator(registry);

        let ep = endpoint(vec![]);
        let unit = unit_config();

        // Run 1: succeeds, writes no cursor-bearing checkpoint (stub source
        // isn't SliceCapable) but establishes a baseline checkpoint entry.
        let ctx1 = orchestrator.start_ingestion_run(&ep, &unit, "t1").await.unwrap();
        let source1: Arc<dyn Connector> = Arc::new(StubSource { records: vec![record(1)] });
        let sink1 = orchestrator.connectors.build("test.sink", &serde_json::json!({})).unwrap();
        orchestrator.run(ctx1, RunDepsInput { source: source1, sink: sink1 }).await.unwrap();

        let checkpoint_key = KvKey::ingestion("ep-1", "jira.issues", Some("test.sink"), "jira");
        let entry_after_run1 = orchestrator.kv.get(&checkpoint_key).await.unwrap().unwrap();
        let version_after_run1 = entry_after_run1.version;

        // Run 2: fails mid-slice.
        let ctx2 = orchestrator.start_ingestion_run(&ep, &unit, "t1").await.unwrap();
        let failing_source: Arc<dyn Connector> = Arc::new(FailingSource);
        let sink2 = orchestrator.connectors.build("test.sink", &serde_json::json!({})).unwrap();
        let result = orchestrator.run(ctx2, RunDepsInput { source: failing_source, sink: sink2 }).await;
        assert!(result.is_err());

        let entry_after_run2 = orchestrator.kv.get(&checkpoint_key).await.unwrap().unwrap();
        assert!(entry_after_run2.version > version_after_run1);
        assert!(entry_after_run2.value.get("lastError").is_some());

        // Run 3 starts from the same cursor run 1 left behind.
        let ctx3 = orchestrator.start_ingestion_run(&ep, &unit, "t1").await.unwrap();
        assert_eq!(ctx3.cursor, entry_after_run1.value.get("cursor").cloned());
    }
}
