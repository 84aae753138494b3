use std::collections::HashMap;

use ingestlake_common::{IngestError, Result};
use ingestlake_connector::Record;

use crate::entity::CdmEntity;

/// `(Record) -> CdmEntity`, pure. Keyed by dataset id in the registry
/// (spec §4.4).
pub trait CdmMapper: Send + Sync {
    fn model_id(&self) -> &str;

    fn map(&self, record: &Record) -> Result<CdmEntity>;
}

#[derive(Default)]
pub struct MapperRegistry {
    mappers: HashMap<String, Box<dyn CdmMapper>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, dataset_id: impl Into<String>, mapper: Box<dyn CdmMapper>) {
        self.mappers.insert(dataset_id.into(), mapper);
    }

    pub fn map(&self, dataset_id: &str, record: &Record) -> Result<CdmEntity> {
        let mapper = self
            .mappers
            .get(dataset_id)
            .ok_or_else(|| IngestError::CdmModelMismatch(format!("no mapper registered for dataset '{dataset_id}'")))?;
        mapper.map(record)
    }

    pub fn model_id_for(&self, dataset_id: &str) -> Option<&str> {
        self.mappers.get(dataset_id).map(|m| m.model_id())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::entity::{cdm_id, CdmProvenance};

    struct JiraIssueMapper;

    impl CdmMapper for JiraIssueMapper {
        fn model_id(&self) -> &str {
            "cdm.work.item"
        }

        fn map(&self, record: &Record) -> Result<CdmEntity> {
            let key = record
                .get("key")
                .and_then(|v| v.as_str())
                .ok_or_else(|| IngestError::CdmModelMismatch("record missing 'key'".into()))?;
            Ok(CdmEntity::Work {
                id: cdm_id("work", "item", "jira", key, None),
                fields: record.get("fields").cloned().unwrap_or(serde_json::json!({})),
                provenance: CdmProvenance {
                    source_id: key.to_string(),
                    source_url: record.get("self").and_then(|v| v.as_str()).map(str::to_string),
                    raw_source: serde_json::json!({ "key": key }),
                },
                updated_at: Utc::now(),
            })
        }
    }

    #[test]
    fn map_missing_dataset_returns_model_mismatch() {
        let registry = MapperRegistry::new();
        let err = registry.map("unknown", &Record::new()).unwrap_err();
        assert!(matches!(err, IngestError::CdmModelMismatch(_)));
    }

    #[test]
    fn registered_mapper_produces_deterministic_id() {
        let mut registry = MapperRegistry::new();
        registry.register("jira.issues", Box::new(JiraIssueMapper));

        let mut record = Record::new();
        record.insert("key".into(), serde_json::json!("PROJ-7"));

        let entity = registry.map("jira.issues", &record).unwrap();
        assert_eq!(entity.id(), "cdm:work:item:jira:PROJ-7");
        assert_eq!(registry.model_id_for("jira.issues"), Some("cdm.work.item"));
    }
}
