//! Canonical Data Model: the fixed schema family every connector's records
//! are normalized into before they reach the catalog or signal engine
//! (spec §4.4 C_CDM).
//!
//! A [`CdmMapper`] is registered per dataset id and turns one upstream
//! [`ingestlake_connector::Record`] into one [`entity::CdmEntity`],
//! deterministically keyed via [`entity::cdm_id`] so re-ingesting the same
//! native record is idempotent at the catalog layer.

mod entity;
mod mapper;

pub use entity::{cdm_id, CdmEntity, CdmProvenance};
pub use mapper::{CdmMapper, MapperRegistry};
