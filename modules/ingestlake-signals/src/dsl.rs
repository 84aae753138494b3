//! The v1 filter DSL (spec §4.5 "DSL (v1)"). `definitionSpec = {version,
//! type, config}`; `parse` rejects anything but `version: 1` up front so a
//! malformed definition is caught before any row is evaluated.

use chrono::{DateTime, Utc};
use ingestlake_catalog::{GraphNode, Severity};
use serde::Deserialize;
use serde_json::Value;

/// Fields a `cdm.generic.filter` condition or severity rule may reference:
/// a small connector-agnostic whitelist plus the escape hatch `properties.*`
/// for connector-specific fields nested under the CDM entity's free-form
/// `fields` blob (spec §4.5 handler 3).
const ALLOWED_GENERIC_FIELDS: &[&str] =
    &["status", "project", "viewCount", "updatedAt", "createdAt", "closedAt", "priority", "labels"];

pub struct Match {
    pub severity: Severity,
    pub summary: String,
}

#[derive(Debug)]
pub enum Handler {
    StaleItem(StaleItemConfig),
    DocOrphan(DocOrphanConfig),
    GenericFilter(GenericFilterConfig),
}

#[derive(Deserialize)]
struct RawSpec {
    version: u32,
    #[serde(rename = "type")]
    handler_type: String,
    config: Value,
}

#[derive(Debug, Deserialize)]
pub struct StaleItemConfig {
    #[serde(rename = "entityType")]
    pub entity_type: String,
    #[serde(rename = "maxAgeDays")]
    pub max_age_days: f64,
    #[serde(rename = "warnAfterDays")]
    pub warn_after_days: Option<f64>,
    #[serde(rename = "errorAfterDays")]
    pub error_after_days: Option<f64>,
    #[serde(default, rename = "statusExclude")]
    pub status_exclude: Vec<String>,
    #[serde(default, rename = "projectInclude")]
    pub project_include: Vec<String>,
    #[serde(default, rename = "projectExclude")]
    pub project_exclude: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DocOrphanConfig {
    #[serde(rename = "entityType")]
    pub entity_type: String,
    #[serde(rename = "minAgeDays")]
    pub min_age_days: f64,
    #[serde(rename = "minViewCount")]
    pub min_view_count: f64,
    #[serde(default, rename = "requireProjectLink")]
    pub require_project_link: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Op {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct SeverityRule {
    #[serde(rename = "when")]
    pub conditions: Vec<Condition>,
    pub severity: SeverityWire,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityWire {
    Info,
    Warning,
    Error,
    Critical,
}

impl From<SeverityWire> for Severity {
    fn from(s: SeverityWire) -> Self {
        match s {
            SeverityWire::Info => Severity::Info,
            SeverityWire::Warning => Severity::Warning,
            SeverityWire::Error => Severity::Error,
            SeverityWire::Critical => Severity::Critical,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenericFilterConfig {
    #[serde(rename = "entityType")]
    pub entity_type: String,
    pub conditions: Vec<Condition>,
    #[serde(default, rename = "summaryTemplate")]
    pub summary_template: Option<String>,
    #[serde(default, rename = "severityRules")]
    pub severity_rules: Vec<SeverityRule>,
}

/// `definitionSpec` must be `{version: 1, type, config}`; any other
/// version is an unsupported-spec skip, not a crash (spec §8 scenario 5).
pub fn parse(spec: &Value) -> Result<Handler, String> {
    let raw: RawSpec = serde_json::from_value(spec.clone()).map_err(|e| format!("malformed definitionSpec: {e}"))?;
    if raw.version != 1 {
        return Err(format!("unsupported definitionSpec version: {}", raw.version));
    }
    match raw.handler_type.as_str() {
        "cdm.work.stale_item" => {
            let config: StaleItemConfig =
                serde_json::from_value(raw.config).map_err(|e| format!("invalid cdm.work.stale_item config: {e}"))?;
            Ok(Handler::StaleItem(config))
        }
        "cdm.doc.orphan" => {
            let config: DocOrphanConfig =
                serde_json::from_value(raw.config).map_err(|e| format!("invalid cdm.doc.orphan config: {e}"))?;
            Ok(Handler::DocOrphan(config))
        }
        "cdm.generic.filter" => {
            let config: GenericFilterConfig =
                serde_json::from_value(raw.config).map_err(|e| format!("invalid cdm.generic.filter config: {e}"))?;
            for condition in &config.conditions {
                validate_field(&condition.field)?;
            }
            for rule in &config.severity_rules {
                for condition in &rule.conditions {
                    validate_field(&condition.field)?;
                }
            }
            Ok(Handler::GenericFilter(config))
        }
        other => Err(format!("unsupported definitionSpec type: {other}")),
    }
}

fn validate_field(field: &str) -> Result<(), String> {
    if ALLOWED_GENERIC_FIELDS.contains(&field) || field.starts_with("properties.") {
        Ok(())
    } else {
        Err(format!("field not allowed: {field}"))
    }
}

pub fn entity_type(handler: &Handler) -> &str {
    match handler {
        Handler::StaleItem(c) => &c.entity_type,
        Handler::DocOrphan(c) => &c.entity_type,
        Handler::GenericFilter(c) => &c.entity_type,
    }
}

fn get_property<'a>(row: &'a GraphNode, field: &str) -> Option<&'a Value> {
    let key = field.strip_prefix("properties.").unwrap_or(field);
    row.properties.get(key)
}

fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.with_timezone(&Utc))
}

fn case_insensitive_contains(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|h| h.eq_ignore_ascii_case(needle))
}

/// `cdm.work.stale_item`: spec §4.5 handler 1.
fn evaluate_stale_item(config: &StaleItemConfig, row: &GraphNode, now: DateTime<Utc>, default_severity: Severity) -> Option<Match> {
    let status = row.properties.get("status").and_then(|v| v.as_str()).unwrap_or("");
    if case_insensitive_contains(&config.status_exclude, status) {
        return None;
    }
    let project = row.properties.get("project").and_then(|v| v.as_str());
    if let Some(project) = project {
        if !config.project_include.is_empty() && !case_insensitive_contains(&config.project_include, project) {
            return None;
        }
        if case_insensitive_contains(&config.project_exclude, project) {
            return None;
        }
    }

    let last_activity = ["updatedAt", "closedAt", "createdAt"]
        .iter()
        .filter_map(|k| row.properties.get(*k).and_then(as_datetime))
        .max()?;

    let age_days = (now - last_activity).num_seconds() as f64 / 86_400.0;
    if age_days < config.max_age_days {
        return None;
    }

    let severity = if config.error_after_days.is_some_and(|d| age_days >= d) {
        Severity::Error
    } else if config.warn_after_days.is_some_and(|d| age_days >= d) {
        Severity::Warning
    } else {
        default_severity
    };

    Some(Match { severity, summary: format!("{} has been inactive for {:.1} days", row.display_name, age_days) })
}

/// `cdm.doc.orphan`: spec §4.5 handler 2.
fn evaluate_doc_orphan(config: &DocOrphanConfig, row: &GraphNode, now: DateTime<Utc>, default_severity: Severity) -> Option<Match> {
    let created_at = row.properties.get("createdAt").and_then(as_datetime)?;
    let age_days = (now - created_at).num_seconds() as f64 / 86_400.0;
    if age_days < config.min_age_days {
        return None;
    }

    let view_count = row.properties.get("viewCount").and_then(|v| v.as_f64()).unwrap_or(0.0);
    if view_count >= config.min_view_count {
        return None;
    }

    if config.require_project_link {
        let linked = row
            .properties
            .get("linkedWorkItems")
            .and_then(|v| v.as_array())
            .map(|a| !a.is_empty())
            .unwrap_or(false);
        if linked {
            return None;
        }
    }

    Some(Match { severity: default_severity, summary: format!("{} appears orphaned ({:.0} views)", row.display_name, view_count) })
}

fn condition_matches(condition: &Condition, row: &GraphNode) -> bool {
    let actual = get_property(row, &condition.field);
    match condition.op {
        Op::IsNull => actual.is_none() || actual == Some(&Value::Null),
        Op::IsNotNull => actual.is_some() && actual != Some(&Value::Null),
        Op::In => actual.is_some_and(|a| condition.value.as_array().is_some_and(|arr| arr.contains(a))),
        Op::NotIn => !actual.is_some_and(|a| condition.value.as_array().is_some_and(|arr| arr.contains(a))),
        Op::Eq => actual == Some(&condition.value),
        Op::Neq => actual != Some(&condition.value),
        Op::Lt | Op::Lte | Op::Gt | Op::Gte => match (actual.and_then(|a| a.as_f64()), condition.value.as_f64()) {
            (Some(a), Some(v)) => match condition.op {
                Op::Lt => a < v,
                Op::Lte => a <= v,
                Op::Gt => a > v,
                Op::Gte => a >= v,
                _ => unreachable!(),
            },
            _ => false,
        },
    }
}

fn render_summary(template: &str, row: &GraphNode) -> String {
    // Only supports the single-token `"{{field}}"` form named in the spec.
    if let Some(field) = template.strip_prefix("{{").and_then(|s| s.strip_suffix("}}")) {
        let field = field.trim();
        return get_property(row, field).map(|v| v.to_string()).unwrap_or_default();
    }
    template.to_string()
}

/// `cdm.generic.filter`: spec §4.5 handler 3. All conditions AND-ed;
/// `severityRules` evaluated first-match-wins before the definition's
/// default severity.
fn evaluate_generic_filter(config: &GenericFilterConfig, row: &GraphNode, default_severity: Severity) -> Option<Match> {
    if !config.conditions.iter().all(|c| condition_matches(c, row)) {
        return None;
    }

    let severity = config
        .severity_rules
        .iter()
        .find(|rule| rule.conditions.iter().all(|c| condition_matches(c, row)))
        .map(|rule| rule.severity.into())
        .unwrap_or(default_severity);

    let summary = config.summary_template.as_deref().map(|t| render_summary(t, row)).unwrap_or_else(|| row.display_name.clone());

    Some(Match { severity, summary })
}

pub fn evaluate(handler: &Handler, row: &GraphNode, now: DateTime<Utc>, default_severity: Severity) -> Option<Match> {
    match handler {
        Handler::StaleItem(config) => evaluate_stale_item(config, row, now, default_severity),
        Handler::DocOrphan(config) => evaluate_doc_orphan(config, row, now, default_severity),
        Handler::GenericFilter(config) => evaluate_generic_filter(config, row, default_severity),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use ingestlake_catalog::NodeUpsert;
    use ingestlake_common::ProvenanceEntry;
    use uuid::Uuid;

    use super::*;

    fn node(properties: Value) -> GraphNode {
        let upsert = NodeUpsert {
            tenant_id: "t1".into(),
            project_id: None,
            entity_type: "cdm.work.item".into(),
            display_name: "ENG-1".into(),
            canonical_path: "cdm:work:item:jira:ENG-1".into(),
            source_system: Some("jira".into()),
            spec_ref: None,
            properties,
            phase: None,
            external_id: serde_json::json!({}),
            provenance_entry: ProvenanceEntry { endpoint_id: "ep-1".into(), ts: Utc::now(), canonical_path: "x".into() },
        };
        GraphNode {
            id: Uuid::new_v4(),
            tenant_id: upsert.tenant_id,
            project_id: upsert.project_id,
            entity_type: upsert.entity_type,
            display_name: upsert.display_name,
            canonical_path: upsert.canonical_path,
            source_system: upsert.source_system,
            spec_ref: upsert.spec_ref,
            properties: upsert.properties,
            version: 1,
            phase: upsert.phase,
            logical_key: "k".into(),
            external_id: upsert.external_id,
            provenance: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn parse_ok(spec: Value) -> Handler {
        parse(&spec).unwrap()
    }

    #[test]
    fn rejects_unsupported_version() {
        let spec = serde_json::json!({"version": 2, "type": "cdm.work.stale_item", "config": {}});
        let err = parse(&spec).unwrap_err();
        assert_eq!(err, "unsupported definitionSpec version: 2");
    }

    #[test]
    fn stale_work_item_scenario_matches_spec_literal_values() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let handler = parse_ok(serde_json::json!({
            "version": 1,
            "type": "cdm.work.stale_item",
            "config": {
                "entityType": "cdm.work.item",
                "maxAgeDays": 3,
                "warnAfterDays": 3,
                "errorAfterDays": 5,
                "statusExclude": ["Done"]
            }
        }));

        let eng1 = node(serde_json::json!({"updatedAt": "2023-12-31T00:00:00Z", "status": "Open"}));
        let m = evaluate(&handler, &eng1, now, Severity::Info).unwrap();
        assert_eq!(m.severity, Severity::Error);

        let eng2 = node(serde_json::json!({"updatedAt": "2024-01-06T00:00:00Z", "status": "Open"}));
        let m = evaluate(&handler, &eng2, now, Severity::Info).unwrap();
        assert_eq!(m.severity, Severity::Warning);

        let eng3 = node(serde_json::json!({"updatedAt": "2024-01-09T00:00:00Z", "status": "Open"}));
        assert!(evaluate(&handler, &eng3, now, Severity::Info).is_none());

        let eng4 = node(serde_json::json!({"updatedAt": "2023-01-01T00:00:00Z", "status": "Done"}));
        assert!(evaluate(&handler, &eng4, now, Severity::Info).is_none());
    }

    #[test]
    fn doc_orphan_scenario_matches_spec_literal_values() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let handler = parse_ok(serde_json::json!({
            "version": 1,
            "type": "cdm.doc.orphan",
            "config": {"entityType": "cdm.doc.item", "minAgeDays": 2, "minViewCount": 5, "requireProjectLink": true}
        }));

        let orphan = node(serde_json::json!({"createdAt": "2024-02-20T00:00:00Z", "viewCount": 1}));
        assert!(evaluate(&handler, &orphan, now, Severity::Warning).is_some());

        let viewed = node(serde_json::json!({"createdAt": "2024-02-20T00:00:00Z", "viewCount": 12}));
        assert!(evaluate(&handler, &viewed, now, Severity::Warning).is_none());

        let linked = node(serde_json::json!({"createdAt": "2024-02-20T00:00:00Z", "viewCount": 1, "linkedWorkItems": ["x"]}));
        assert!(evaluate(&handler, &linked, now, Severity::Warning).is_none());

        let young = node(serde_json::json!({"createdAt": "2024-03-01T00:00:00Z", "viewCount": 1}));
        assert!(evaluate(&handler, &young, now, Severity::Warning).is_none());
    }

    #[test]
    fn generic_filter_rejects_field_not_in_whitelist() {
        let spec = serde_json::json!({
            "version": 1,
            "type": "cdm.generic.filter",
            "config": {"entityType": "cdm.work.item", "conditions": [{"field": "secretInternalColumn", "op": "EQ", "value": 1}]}
        });
        let err = parse(&spec).unwrap_err();
        assert_eq!(err, "field not allowed: secretInternalColumn");
    }

    #[test]
    fn generic_filter_severity_rules_first_match_wins() {
        let handler = parse_ok(serde_json::json!({
            "version": 1,
            "type": "cdm.generic.filter",
            "config": {
                "entityType": "cdm.work.item",
                "conditions": [{"field": "status", "op": "EQ", "value": "Blocked"}],
                "severityRules": [
                    {"when": [{"field": "priority", "op": "EQ", "value": "P0"}], "severity": "CRITICAL"},
                    {"when": [], "severity": "WARNING"}
                ]
            }
        }));
        let row = node(serde_json::json!({"status": "Blocked", "priority": "P0"}));
        let m = evaluate(&handler, &row, Utc::now(), Severity::Info).unwrap();
        assert_eq!(m.severity, Severity::Critical);
    }
}
