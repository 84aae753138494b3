use async_trait::async_trait;
use ingestlake_common::Result;

use crate::DispatchedEvent;

/// Events carry a type string and know how to serialize for the event log.
pub trait EventLike: Clone + Send + Sync + 'static {
    fn event_type_str(&self) -> String;

    fn to_persist_payload(&self) -> serde_json::Value;
}

/// Pure state updates. No I/O, no side effects.
///
/// Called for every event before routing. Use for run stats, slice counters,
/// and other state derivable purely from the event stream.
pub trait Reducer<E: EventLike, S: Send>: Send + Sync {
    fn reduce(&self, state: &mut S, event: &E);
}

/// Routes events to handlers. May perform I/O, emit new events.
///
/// Receives the persisted [`DispatchedEvent`] (for causal chaining or
/// external projection). Returns zero or more child events that re-enter
/// the dispatch loop.
#[async_trait]
pub trait Router<E: EventLike, S: Send, D: Send + Sync>: Send + Sync {
    async fn route(&self, event: &E, stored: &DispatchedEvent, state: &S, deps: &D) -> Result<Vec<E>>;
}

/// Persists events and returns a handle carrying a monotonic sequence
/// number. This is the seam a durable workflow engine would occupy in
/// production; `InMemoryEventLog` is the in-process stand-in used by tests
/// and by the orchestrator's local/dev run path.
#[async_trait]
pub trait EventPersister: Send + Sync {
    async fn persist(&self, event_type: String, payload: serde_json::Value, run_id: &str) -> Result<DispatchedEvent>;

    async fn persist_child(
        &self,
        parent_seq: i64,
        event_type: String,
        payload: serde_json::Value,
        run_id: &str,
    ) -> Result<DispatchedEvent>;
}
