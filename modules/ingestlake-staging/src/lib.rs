//! Staging provider (spec §4.2 C5): decouples source export rate from sink
//! ingest rate and allows retries over the same materialized slice.
//!
//! Sessions resolve to deterministic object-store keys under
//! `ingestion/<workspace>/<endpoint>/<run>/<sliceIndex>`. Handles
//! (`{bucket, key}`, carried implicitly by the backing `ObjectStore`) are
//! exchanged between the source worker and sink worker; record payloads
//! never pass through the orchestrator directly.

mod gc;
mod session;
mod types;

pub use gc::sweep_expired_sessions;
pub use session::{RecordReader, RecordWriter, Session, DEFAULT_TTL_DAYS};
pub use types::{Batch, SessionKey, SessionManifest};
