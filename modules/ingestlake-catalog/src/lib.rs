//! Graph catalog store (spec §3.1 `GraphNode`/`GraphEdge`, §4.6 `GraphStore`)
//! and the metadata/provenance index (spec §3.1 `Dataset`, §6.7
//! `metadata_records`).
//!
//! Nodes and edges are addressed by `(tenantId, logicalKey)`; upserts bump
//! `version` and append one provenance entry rather than replacing history.
//! `logicalKey` and `tenantId` are immutable once a node exists (spec §4.6).

pub mod metadata;
pub mod model;
pub mod postgres;
pub mod signals;
pub mod store;

pub use metadata::{memory::InMemoryCatalogStore, CatalogStore, PostgresCatalogStore};
pub use model::{dataset_identity, EdgeUpsert, GraphEdge, GraphNode, MetadataRecord, NodeUpsert};
pub use postgres::PostgresGraphStore;
pub use signals::{
    memory::InMemorySignalStore, DefinitionStatus, ImplMode, InstanceStatus, MatchedInstance, PostgresSignalStore,
    Severity, SignalDefinition, SignalInstance, SignalStore,
};
pub use store::{memory::InMemoryGraphStore, GraphStore};
