//! The reconciliation loop (spec §4.5 steps 1-3): for every active
//! definition, page through matching `GraphNode`s, upsert matches as OPEN,
//! and resolve any previously-OPEN instance that wasn't matched this run.
//!
//! One definition's failure (bad DSL, store error) never aborts the others
//! (spec §4.5 "failure isolation" / §8 scenario 5).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use ingestlake_catalog::{GraphStore, InstanceStatus, MatchedInstance, SignalDefinition, SignalInstance, SignalStore};
use ingestlake_common::Result as IngestResult;

use crate::dsl;

const PAGE_SIZE: i64 = 200;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefinitionOutcome {
    pub matched: usize,
    pub created: usize,
    pub updated: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub definition_slug: String,
    pub outcome: Result<DefinitionOutcome, String>,
}

pub struct EvaluateOptions<'a> {
    pub tenant_id: &'a str,
    pub source_run_id: Option<String>,
    pub dry_run: bool,
    pub now: DateTime<Utc>,
}

pub async fn evaluate_signals(
    graph: &dyn GraphStore,
    signals: &dyn SignalStore,
    options: EvaluateOptions<'_>,
) -> IngestResult<Vec<EvaluationReport>> {
    let definitions = signals.list_definitions(None, true).await?;
    let mut reports = Vec::with_capacity(definitions.len());

    for definition in definitions {
        let outcome = evaluate_definition(graph, signals, &definition, &options).await;
        if let Err(reason) = &outcome {
            tracing::warn!(slug = %definition.slug, error = %reason, "signal definition skipped");
        }
        reports.push(EvaluationReport { definition_slug: definition.slug.clone(), outcome });
    }

    Ok(reports)
}

async fn evaluate_definition(
    graph: &dyn GraphStore,
    signals: &dyn SignalStore,
    definition: &SignalDefinition,
    options: &EvaluateOptions<'_>,
) -> Result<DefinitionOutcome, String> {
    let handler = dsl::parse(&definition.definition_spec)?;
    let entity_type = dsl::entity_type(&handler).to_string();

    let existing = signals
        .list_instances(definition.id, 0, i64::MAX)
        .await
        .map_err(|e| e.to_string())?;
    let mut previously_open: HashSet<String> =
        existing.iter().filter(|i| i.status == InstanceStatus::Open).map(|i| i.entity_ref.clone()).collect();
    let existing_by_ref: std::collections::HashMap<&str, &SignalInstance> =
        existing.iter().map(|i| (i.entity_ref.as_str(), i)).collect();

    let mut outcome = DefinitionOutcome::default();
    let mut offset = 0i64;

    loop {
        let page = graph
            .list_nodes(options.tenant_id, Some(std::slice::from_ref(&entity_type)), None, PAGE_SIZE, offset)
            .await
            .map_err(|e| e.to_string())?;
        if page.is_empty() {
            break;
        }
        let page_len = page.len();

        for row in &page {
            let Some(hit) = dsl::evaluate(&handler, row, options.now, definition.severity) else {
                continue;
            };
            let entity_ref = row.canonical_path.clone();

            if existing_by_ref.get(entity_ref.as_str()).is_some_and(|prior| prior.status == InstanceStatus::Suppressed) {
                continue;
            }
            outcome.matched += 1;
            match existing_by_ref.get(entity_ref.as_str()) {
                Some(_) => outcome.updated += 1,
                None => outcome.created += 1,
            }
            previously_open.remove(&entity_ref);

            if options.dry_run {
                continue;
            }
            signals
                .upsert_matched(MatchedInstance {
                    definition_id: definition.id,
                    entity_ref,
                    entity_kind: entity_type.clone(),
                    severity: hit.severity,
                    summary: hit.summary,
                    details: row.properties.clone(),
                    source_run_id: options.source_run_id.clone(),
                })
                .await
                .map_err(|e| e.to_string())?;
        }

        offset += page_len as i64;
        if (page_len as i64) < PAGE_SIZE {
            break;
        }
    }

    outcome.resolved = previously_open.len();
    if !options.dry_run {
        for entity_ref in &previously_open {
            signals
                .resolve_instance(definition.id, entity_ref, options.now)
                .await
                .map_err(|e| e.to_string())?;
        }
    }

    Ok(outcome)
}
