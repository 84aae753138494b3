//! `cdm.work.item` mapper for Jira issues. The raw Jira payload is nested
//! and inconsistently typed (`fields.status.name`, `fields.project.key`,
//! ...); the signal DSL's field whitelist only knows flat canonical names,
//! so this is where that flattening happens rather than in the DSL itself.

use ingestlake_cdm::{cdm_id, CdmEntity, CdmMapper, CdmProvenance};
use ingestlake_common::{IngestError, Result};
use ingestlake_connector::Record;

pub struct JiraIssueMapper {
    pub base_url: String,
}

fn string_field(fields: &serde_json::Value, path: &[&str]) -> Option<String> {
    let mut cursor = fields;
    for segment in path {
        cursor = cursor.get(segment)?;
    }
    cursor.as_str().map(str::to_string)
}

fn labels(fields: &serde_json::Value) -> Vec<String> {
    fields
        .get("labels")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

impl CdmMapper for JiraIssueMapper {
    fn model_id(&self) -> &str {
        "cdm.work.item"
    }

    fn map(&self, record: &Record) -> Result<CdmEntity> {
        let key = record
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| IngestError::CdmModelMismatch("jira issue record missing 'key'".into()))?;
        let raw_fields = record.get("fields").cloned().unwrap_or(serde_json::json!({}));

        let normalized = serde_json::json!({
            "title": string_field(&raw_fields, &["summary"]),
            "status": string_field(&raw_fields, &["status", "name"]),
            "project": string_field(&raw_fields, &["project", "key"]),
            "priority": string_field(&raw_fields, &["priority", "name"]),
            "assignee": string_field(&raw_fields, &["assignee", "displayName"]),
            "createdAt": string_field(&raw_fields, &["created"]),
            "updatedAt": string_field(&raw_fields, &["updated"]),
            "closedAt": string_field(&raw_fields, &["resolutiondate"]),
            "labels": labels(&raw_fields),
            "issueType": string_field(&raw_fields, &["issuetype", "name"]),
        });

        let updated_at = string_field(&raw_fields, &["updated"])
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(chrono::Utc::now);

        Ok(CdmEntity::Work {
            id: cdm_id("work", "item", "jira", key, None),
            fields: normalized,
            provenance: CdmProvenance {
                source_id: key.to_string(),
                source_url: Some(format!("{}/browse/{key}", self.base_url.trim_end_matches('/'))),
                raw_source: raw_fields,
            },
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(key: &str, status: &str, updated: &str) -> Record {
        let mut record = Record::new();
        record.insert("key".into(), serde_json::json!(key));
        record.insert(
            "fields".into(),
            serde_json::json!({
                "summary": "Investigate flaky ingest run",
                "status": {"name": status},
                "project": {"key": "ENG"},
                "priority": {"name": "P1"},
                "updated": updated,
                "created": "2024-01-01T00:00:00.000+0000",
                "labels": ["ingest", "flaky"]
            }),
        );
        record
    }

    #[test]
    fn maps_issue_key_to_deterministic_cdm_id() {
        let mapper = JiraIssueMapper { base_url: "https://acme.atlassian.net".into() };
        let entity = mapper.map(&issue("ENG-42", "Open", "2024-01-05T00:00:00.000+0000")).unwrap();
        assert_eq!(entity.id(), "cdm:work:item:jira:ENG-42");
        assert_eq!(entity.model_name(), "work");
    }

    #[test]
    fn flattens_nested_jira_fields_into_canonical_names() {
        let mapper = JiraIssueMapper { base_url: "https://acme.atlassian.net".into() };
        let entity = mapper.map(&issue("ENG-42", "Blocked", "2024-01-05T00:00:00.000+0000")).unwrap();
        let fields = entity.fields();
        assert_eq!(fields["status"], "Blocked");
        assert_eq!(fields["project"], "ENG");
        assert_eq!(fields["priority"], "P1");
        assert_eq!(fields["labels"], serde_json::json!(["ingest", "flaky"]));
    }

    #[test]
    fn missing_key_is_cdm_model_mismatch() {
        let mapper = JiraIssueMapper { base_url: "https://acme.atlassian.net".into() };
        let err = mapper.map(&Record::new()).unwrap_err();
        assert!(matches!(err, IngestError::CdmModelMismatch(_)));
    }
}
