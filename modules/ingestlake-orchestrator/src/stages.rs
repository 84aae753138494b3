use std::sync::Arc;

use chrono::Utc;
use ingestlake_catalog::{dataset_identity, GraphStore, NodeUpsert};
use ingestlake_cdm::{CdmEntity, MapperRegistry};
use ingestlake_common::{IngestError, ProvenanceEntry, Result};
use ingestlake_connector::{Connector, Record, RecordIterator, Slice, SinkStats};
use ingestlake_objectstore::ObjectStore;
use ingestlake_staging::{Session, SessionKey};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::budget::SliceBudget;
use crate::run::RunContext;

/// Result of executing one planned slice (spec §4.3 step 3 `SliceResult`).
/// `slice_index` is carried rather than the full staging handle so the
/// persist stage can reconstruct the same `SessionKey` deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceOutcome {
    pub slice_id: String,
    pub slice_index: u32,
    pub new_checkpoint: Option<serde_json::Value>,
    pub stats: Option<serde_json::Value>,
    pub transient_state: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistStats {
    pub records_written: u64,
    pub batches_written: u64,
    pub dataset_nodes_upserted: u64,
}

/// Delegates to `AdaptiveIngestion` when the source advertises it; falls
/// back to `SliceCapable` checkpoint-driven planning; falls back further to
/// a single whole-dataset slice (spec §4.3 step 2).
pub async fn plan(source: &Arc<dyn Connector>, ctx: &RunContext) -> Result<(String, Vec<Slice>)> {
    if let Some(adaptive) = source.as_adaptive() {
        let probe = adaptive.probe_ingestion(&ctx.dataset_id, &ctx.merged_policy).await?;
        let plan = adaptive.plan_ingestion(&probe, &ctx.merged_policy).await?;
        return Ok((plan.strategy, plan.slices));
    }
    if let Some(slice_capable) = source.as_slice_capable() {
        let slices = slice_capable
            .plan_slices(&ctx.dataset_id, ctx.cursor.as_ref(), ctx.resolved_policy.fetch_size as u64)
            .await?;
        return Ok(("slice_capable".into(), slices));
    }
    Ok((
        "single_slice".into(),
        vec![Slice { slice_id: "single".into(), sequence: 0, params: serde_json::json!({}), estimated_rows: None }],
    ))
}

/// Runs planned slices in batches of `maxParallelSlices` (spec §5 "Within a
/// run"). One slice failure always aborts the remaining batches; within the
/// failing batch, `cancel_siblings_on_failure` (default true) governs
/// whether still-running siblings are aborted immediately or allowed to
/// finish with their results discarded (SPEC_FULL.md §D.2).
pub async fn execute_slices(
    source: Arc<dyn Connector>,
    object_store: Arc<dyn ObjectStore>,
    ctx: &RunContext,
    budget: Arc<SliceBudget>,
    slices: Vec<Slice>,
) -> Result<Vec<SliceOutcome>> {
    let mut outcomes = Vec::new();
    let batch_size = ctx.resolved_policy.max_parallel_slices.max(1) as usize;

    for batch in slices.chunks(batch_size) {
        let mut join_set: JoinSet<Result<SliceOutcome>> = JoinSet::new();
        for slice in batch {
            let source = source.clone();
            let object_store = object_store.clone();
            let budget = budget.clone();
            let ctx = ctx.clone();
            let slice = slice.clone();
            join_set.spawn(async move {
                let _permit = budget.acquire().await;
                run_slice(&source, &object_store, &ctx, slice).await
            });
        }

        let mut batch_outcomes = Vec::new();
        let mut batch_err: Option<IngestError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(outcome)) => batch_outcomes.push(outcome),
                Ok(Err(e)) => {
                    if ctx.resolved_policy.cancel_siblings_on_failure && batch_err.is_none() {
                        join_set.abort_all();
                    }
                    batch_err.get_or_insert(e);
                }
                Err(join_err) => {
                    batch_err.get_or_insert(IngestError::Other(anyhow::anyhow!(join_err.to_string())));
                }
            }
        }
        if let Some(e) = batch_err {
            return Err(e);
        }
        outcomes.extend(batch_outcomes);
    }
    Ok(outcomes)
}

async fn run_slice(
    source: &Arc<dyn Connector>,
    object_store: &Arc<dyn ObjectStore>,
    ctx: &RunContext,
    slice: Slice,
) -> Result<SliceOutcome> {
    let session_key = SessionKey {
        workspace: ctx.workspace.clone(),
        endpoint_id: ctx.endpoint_id.to_string(),
        run_id: ctx.run_id.clone(),
        slice_index: slice.sequence,
    };
    let session = Session::allocate(object_store.clone(), session_key, ingestlake_staging::DEFAULT_TTL_DAYS).await?;

    let mut iterator: Box<dyn RecordIterator> = if let Some(slice_capable) = source.as_slice_capable() {
        slice_capable.read_slice(&ctx.dataset_id, &slice).await?
    } else if let Some(src) = source.as_source() {
        src.read(&ctx.dataset_id, Some(&slice), None).await?
    } else {
        return Err(IngestError::CapabilityMissing("source".into()));
    };

    let fetch_size = ctx.resolved_policy.fetch_size.max(1) as usize;
    let mut batch: Vec<Record> = Vec::with_capacity(fetch_size);
    let mut records_written = 0u64;

    while let Some(record) = iterator.next().await? {
        batch.push(record);
        if batch.len() >= fetch_size {
            records_written += batch.len() as u64;
            session.writer().write_batch(&batch).await?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        records_written += batch.len() as u64;
        session.writer().write_batch(&batch).await?;
    }
    iterator.close().await?;
    session.close().await?;

    let new_checkpoint = if let Some(slice_capable) = source.as_slice_capable() {
        slice_capable.get_checkpoint(&ctx.dataset_id).await?
    } else {
        None
    };

    Ok(SliceOutcome {
        slice_id: slice.slice_id,
        slice_index: slice.sequence,
        new_checkpoint,
        stats: Some(serde_json::json!({ "recordsWritten": records_written })),
        transient_state: None,
    })
}

/// Reads every slice's staged batches back, routes them through the CDM
/// mapper when `mode=cdm`, syncs `catalog.dataset` records into the graph
/// when raw, and drives the sink's `begin`/`writeBatch`/`commit` lifecycle
/// exactly once per run (spec §4.3 step 4).
pub async fn persist_batches(
    sink: &dyn ingestlake_connector::SinkEndpoint,
    object_store: &Arc<dyn ObjectStore>,
    graph: &dyn GraphStore,
    mappers: &MapperRegistry,
    ctx: &RunContext,
    outcomes: &[SliceOutcome],
) -> Result<PersistStats> {
    let run_ctx_json = serde_json::json!({
        "runId": ctx.run_id,
        "endpointId": ctx.endpoint_id.to_string(),
        "unitId": ctx.unit_id.to_string(),
    });
    sink.begin(&run_ctx_json).await?;

    let mut stats = PersistStats::default();

    for outcome in outcomes {
        let session_key = SessionKey {
            workspace: ctx.workspace.clone(),
            endpoint_id: ctx.endpoint_id.to_string(),
            run_id: ctx.run_id.clone(),
            slice_index: outcome.slice_index,
        };
        let session = Session::reopen(object_store.clone(), session_key);
        let fetch_size = ctx.resolved_policy.fetch_size.max(1) as usize;
        let batches = session.reader().iter_batches(fetch_size).await?;

        for batch in batches {
            if batch.is_empty() {
                continue;
            }
            let mut out_records = Vec::with_capacity(batch.len());
            for mut record in batch {
                if let Some(cdm_model_id) = &ctx.cdm_model_id {
                    let entity = mappers.map(&ctx.dataset_id, &record)?;
                    let entity_model = format!("cdm.{}.item", entity.model_name());
                    if !ingestlake_connector::cdm_model_supported(std::slice::from_ref(cdm_model_id), &entity_model) {
                        tracing::warn!(declared = %cdm_model_id, actual = %entity_model, "mapped entity model diverges from declared cdmModelId");
                    }
                    let mut cdm_record = Record::new();
                    cdm_record.insert("id".into(), serde_json::json!(entity.id()));
                    cdm_record.insert("model".into(), serde_json::json!(entity_model));
                    cdm_record.insert("fields".into(), entity.fields().clone());
                    upsert_cdm_node(&entity, &entity_model, ctx, graph).await?;
                    out_records.push(cdm_record);
                } else {
                    if record.get("domain").and_then(|v| v.as_str()) == Some("catalog.dataset") {
                        sync_catalog_dataset(&mut record, ctx, graph).await?;
                        stats.dataset_nodes_upserted += 1;
                    }
                    out_records.push(record);
                }
            }
            stats.records_written += out_records.len() as u64;
            stats.batches_written += 1;
            sink.write_batch(&out_records, &run_ctx_json).await?;
        }
    }

    let sink_stats = SinkStats { records_written: stats.records_written, batches_written: stats.batches_written };
    sink.commit(&run_ctx_json, Some(&sink_stats)).await?;
    Ok(stats)
}

/// CDM rows land in the graph catalog alongside the external sink write so
/// the signal evaluator has something concrete to scan (spec §2 "C8
/// periodically reads C9/C3"; the orchestrator-to-sink handoff in step 4
/// doesn't by itself place CDM rows anywhere queryable).
async fn upsert_cdm_node(entity: &CdmEntity, entity_model: &str, ctx: &RunContext, graph: &dyn GraphStore) -> Result<()> {
    let display_name = entity
        .fields()
        .get("title")
        .or_else(|| entity.fields().get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or(entity.id())
        .to_string();

    graph
        .upsert_node(NodeUpsert {
            tenant_id: ctx.tenant_id.clone(),
            project_id: None,
            entity_type: entity_model.to_string(),
            display_name,
            canonical_path: entity.id().to_string(),
            source_system: Some(ctx.vendor_key.clone()),
            spec_ref: Some(ctx.cdm_model_id.clone().unwrap_or_default()),
            properties: entity.fields().clone(),
            phase: None,
            external_id: serde_json::json!({ "cdmId": entity.id() }),
            provenance_entry: ProvenanceEntry { endpoint_id: ctx.endpoint_id.clone(), ts: Utc::now(), canonical_path: entity.id().to_string() },
        })
        .await?;
    Ok(())
}

async fn sync_catalog_dataset(record: &mut Record, ctx: &RunContext, graph: &dyn GraphStore) -> Result<()> {
    let payload = record.get("payload").cloned().unwrap_or_else(|| serde_json::json!({}));
    let source_id = payload.get("sourceId").and_then(|v| v.as_str()).unwrap_or(ctx.endpoint_id.as_str()).to_string();
    let database = payload.get("database").and_then(|v| v.as_str()).map(str::to_string);
    let schema = payload.get("schema").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let table = payload.get("table").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let identity = dataset_identity(&ctx.tenant_id, &source_id, database.as_deref(), &schema, &table);

    let mut imprinted = payload;
    if let Some(obj) = imprinted.as_object_mut() {
        let dataset_entry = obj.entry("dataset").or_insert_with(|| serde_json::json!({}));
        if let Some(dataset_obj) = dataset_entry.as_object_mut() {
            dataset_obj.insert("id".into(), serde_json::json!(identity));
        }
    }
    record.insert("payload".into(), imprinted.clone());

    graph
        .upsert_node(NodeUpsert {
            tenant_id: ctx.tenant_id.clone(),
            project_id: None,
            entity_type: "catalog.dataset".into(),
            display_name: table.clone(),
            canonical_path: identity.clone(),
            source_system: Some(source_id.clone()),
            spec_ref: None,
            properties: imprinted,
            phase: None,
            external_id: serde_json::json!({ "sourceId": source_id, "schema": schema, "table": table }),
            provenance_entry: ProvenanceEntry { endpoint_id: ctx.endpoint_id.clone(), ts: Utc::now(), canonical_path: identity },
        })
        .await?;
    Ok(())
}
