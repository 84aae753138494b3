//! Endpoint registry and connector runtime (spec §4.1 C4).
//!
//! A connector is a variant over capability sets: every connector exposes
//! `describe()`/`validate_config()`, and opts into [`SourceEndpoint`],
//! [`SliceCapable`], [`AdaptiveIngestion`], [`MetadataCapable`],
//! [`SinkEndpoint`], [`ActionEndpoint`] by overriding the matching
//! accessor on [`Connector`]. The [`ConnectorRegistry`] resolves a
//! `templateId` to a built instance; capability negotiation is then a
//! plain method call that returns `None` rather than panicking when a
//! connector doesn't support it.

pub mod capabilities;
pub mod iterator;
pub mod registry;
pub mod security;
pub mod types;

pub use capabilities::{
    cdm_model_supported, ActionDescriptor, ActionEndpoint, ActionRequest, ActionResult, AdaptiveIngestion,
    CatalogSnapshot, Connector, Environment, IngestionPlan, Mention, MentionExtractor, MetadataCapable, ProbeResult,
    Relation, RelationExtractor, SinkEndpoint, SinkStats, SliceCapable, SourceEndpoint,
};
pub use iterator::{RecordIterator, VecRecordIterator};
pub use registry::{ConnectorFactory, ConnectorRegistry};
pub use security::UrlValidator;
pub use types::{Dataset, Endpoint, EndpointTemplate, FieldDescriptor, Record, Slice, ValidateConfigResult};
