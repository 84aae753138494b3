use std::sync::Arc;

use async_trait::async_trait;
use ingestlake_catalog::GraphStore;
use ingestlake_cdm::MapperRegistry;
use ingestlake_common::Result;
use ingestlake_connector::{Connector, Slice};
use ingestlake_engine::{DispatchedEvent, EventLike, Reducer, Router};
use ingestlake_objectstore::ObjectStore;

use crate::budget::SliceBudget;
use crate::run::RunContext;
use crate::stages::{execute_slices, persist_batches, plan, PersistStats, SliceOutcome};

/// Stage-dispatch events for one ingestion run, driven by
/// `ingestlake_engine::Engine` (spec §4.3 steps 2-4).
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started,
    Planned { strategy: String, slices: Vec<Slice> },
    SlicesExecuted { outcomes: Vec<SliceOutcome> },
    Persisted { stats: PersistStats },
}

impl EventLike for RunEvent {
    fn event_type_str(&self) -> String {
        match self {
            RunEvent::Started => "run.started".into(),
            RunEvent::Planned { .. } => "run.planned".into(),
            RunEvent::SlicesExecuted { .. } => "run.slices_executed".into(),
            RunEvent::Persisted { .. } => "run.persisted".into(),
        }
    }

    fn to_persist_payload(&self) -> serde_json::Value {
        match self {
            RunEvent::Started => serde_json::json!({}),
            RunEvent::Planned { strategy, slices } => serde_json::json!({ "strategy": strategy, "sliceCount": slices.len() }),
            RunEvent::SlicesExecuted { outcomes } => serde_json::json!({ "outcomes": outcomes }),
            RunEvent::Persisted { stats } => serde_json::json!({ "stats": stats }),
        }
    }
}

/// Accumulated run state, built purely from the event stream (spec §4.3
/// step 5 "Aggregate slice stats").
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub plan_strategy: Option<String>,
    pub planned_slice_count: usize,
    pub slice_outcomes: Vec<SliceOutcome>,
    pub persist_stats: Option<PersistStats>,
}

pub struct RunReducer;

impl Reducer<RunEvent, RunState> for RunReducer {
    fn reduce(&self, state: &mut RunState, event: &RunEvent) {
        match event {
            RunEvent::Started => {}
            RunEvent::Planned { strategy, slices } => {
                state.plan_strategy = Some(strategy.clone());
                state.planned_slice_count = slices.len();
            }
            RunEvent::SlicesExecuted { outcomes } => {
                state.slice_outcomes = outcomes.clone();
            }
            RunEvent::Persisted { stats } => {
                state.persist_stats = Some(stats.clone());
            }
        }
    }
}

/// Everything a run's stages need besides the event itself. Owned handles
/// only (`Arc`/`Clone`) so stage functions can fan work out across spawned
/// tasks without lifetime entanglement with the dispatch loop.
pub struct RunDeps {
    pub source: Arc<dyn Connector>,
    pub sink: Arc<dyn Connector>,
    pub object_store: Arc<dyn ObjectStore>,
    pub graph: Arc<dyn GraphStore>,
    pub mappers: Arc<MapperRegistry>,
    pub budget: Arc<SliceBudget>,
    pub ctx: RunContext,
}

pub struct RunRouter;

#[async_trait]
impl Router<RunEvent, RunState, RunDeps> for RunRouter {
    async fn route(&self, event: &RunEvent, _stored: &DispatchedEvent, _state: &RunState, deps: &RunDeps) -> Result<Vec<RunEvent>> {
        match event {
            RunEvent::Started => {
                let (strategy, slices) = plan(&deps.source, &deps.ctx).await?;
                Ok(vec![RunEvent::Planned { strategy, slices }])
            }
            RunEvent::Planned { slices, .. } => {
                let outcomes = execute_slices(
                    deps.source.clone(),
                    deps.object_store.clone(),
                    &deps.ctx,
                    deps.budget.clone(),
                    slices.clone(),
                )
                .await?;
                Ok(vec![RunEvent::SlicesExecuted { outcomes }])
            }
            RunEvent::SlicesExecuted { outcomes } => {
                let sink = deps
                    .sink
                    .as_sink()
                    .ok_or_else(|| ingestlake_common::IngestError::CapabilityMissing("sink".into()))?;
                let stats = persist_batches(sink, &deps.object_store, deps.graph.as_ref(), deps.mappers.as_ref(), &deps.ctx, outcomes)
                    .await?;
                Ok(vec![RunEvent::Persisted { stats }])
            }
            RunEvent::Persisted { .. } => Ok(vec![]),
        }
    }
}
