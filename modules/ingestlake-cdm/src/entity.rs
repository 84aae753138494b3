use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounded metadata subset of the upstream payload a mapper attaches to
/// every entity it produces. Never carries bulk bodies/binaries (spec
/// §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdmProvenance {
    pub source_id: String,
    pub source_url: Option<String>,
    pub raw_source: serde_json::Value,
}

/// Common fields every CDM model shares, regardless of which variant it
/// is. Individual model payloads nest under `fields` as a free-form JSON
/// object shaped by the mapper (spec §4.4's "fixed schema family").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CdmEntity {
    Work { id: String, fields: serde_json::Value, provenance: CdmProvenance, updated_at: DateTime<Utc> },
    Doc { id: String, fields: serde_json::Value, provenance: CdmProvenance, updated_at: DateTime<Utc> },
    Space { id: String, fields: serde_json::Value, provenance: CdmProvenance, updated_at: DateTime<Utc> },
    Item { id: String, fields: serde_json::Value, provenance: CdmProvenance, updated_at: DateTime<Utc> },
    Revision { id: String, fields: serde_json::Value, provenance: CdmProvenance, updated_at: DateTime<Utc> },
    Link { id: String, fields: serde_json::Value, provenance: CdmProvenance, updated_at: DateTime<Utc> },
    User { id: String, fields: serde_json::Value, provenance: CdmProvenance, updated_at: DateTime<Utc> },
    Project { id: String, fields: serde_json::Value, provenance: CdmProvenance, updated_at: DateTime<Utc> },
    Comment { id: String, fields: serde_json::Value, provenance: CdmProvenance, updated_at: DateTime<Utc> },
    Log { id: String, fields: serde_json::Value, provenance: CdmProvenance, updated_at: DateTime<Utc> },
}

impl CdmEntity {
    pub fn id(&self) -> &str {
        match self {
            CdmEntity::Work { id, .. }
            | CdmEntity::Doc { id, .. }
            | CdmEntity::Space { id, .. }
            | CdmEntity::Item { id, .. }
            | CdmEntity::Revision { id, .. }
            | CdmEntity::Link { id, .. }
            | CdmEntity::User { id, .. }
            | CdmEntity::Project { id, .. }
            | CdmEntity::Comment { id, .. }
            | CdmEntity::Log { id, .. } => id,
        }
    }

    pub fn model_name(&self) -> &'static str {
        match self {
            CdmEntity::Work { .. } => "work",
            CdmEntity::Doc { .. } => "doc",
            CdmEntity::Space { .. } => "space",
            CdmEntity::Item { .. } => "item",
            CdmEntity::Revision { .. } => "revision",
            CdmEntity::Link { .. } => "link",
            CdmEntity::User { .. } => "user",
            CdmEntity::Project { .. } => "project",
            CdmEntity::Comment { .. } => "comment",
            CdmEntity::Log { .. } => "log",
        }
    }

    pub fn fields(&self) -> &serde_json::Value {
        match self {
            CdmEntity::Work { fields, .. }
            | CdmEntity::Doc { fields, .. }
            | CdmEntity::Space { fields, .. }
            | CdmEntity::Item { fields, .. }
            | CdmEntity::Revision { fields, .. }
            | CdmEntity::Link { fields, .. }
            | CdmEntity::User { fields, .. }
            | CdmEntity::Project { fields, .. }
            | CdmEntity::Comment { fields, .. }
            | CdmEntity::Log { fields, .. } => fields,
        }
    }
}

/// `cdm:<domain>:<model>:<source_system>:<native_id>`. Doc-items on
/// per-drive systems append `driveId` so the same native id on two drives
/// doesn't collide (spec §4.4).
pub fn cdm_id(domain: &str, model: &str, source_system: &str, native_id: &str, drive_id: Option<&str>) -> String {
    match drive_id {
        Some(drive) => format!("cdm:{domain}:{model}:{source_system}:{native_id}:{drive}"),
        None => format!("cdm:{domain}:{model}:{source_system}:{native_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdm_id_without_drive_matches_spec_shape() {
        assert_eq!(cdm_id("work", "item", "jira", "PROJ-1", None), "cdm:work:item:jira:PROJ-1");
    }

    #[test]
    fn cdm_id_with_drive_appends_drive_id() {
        let id = cdm_id("doc", "item", "gdrive", "file-1", Some("drive-42"));
        assert_eq!(id, "cdm:doc:item:gdrive:file-1:drive-42");
    }

    #[test]
    fn same_native_id_on_different_drives_does_not_collide() {
        let a = cdm_id("doc", "item", "gdrive", "file-1", Some("drive-a"));
        let b = cdm_id("doc", "item", "gdrive", "file-1", Some("drive-b"));
        assert_ne!(a, b);
    }
}
