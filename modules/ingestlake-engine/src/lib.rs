//! Generic stage-dispatch engine shared by the ingestion orchestrator
//! (spec §4.3) and the signal evaluator (spec §4.5).
//!
//! `EventLike`/`Reducer`/`Router`/`EventPersister` are the seams: a concrete
//! domain plugs in its own event enum, run state, and dependency bundle,
//! and gets causal-chain dispatch (persist → reduce → route → recurse)
//! for free. `EventPersister` is also the seam a durable workflow engine
//! occupies in production (spec §6.3); `InMemoryEventLog` is the stand-in
//! used here and by tests.

mod engine;
mod memory;
mod traits;

pub use engine::Engine;
pub use memory::InMemoryEventLog;
pub use traits::{EventLike, EventPersister, Reducer, Router};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted event with its sequence number and causal parent, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchedEvent {
    pub seq: i64,
    pub parent_seq: Option<i64>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub run_id: String,
    pub recorded_at: DateTime<Utc>,
}
