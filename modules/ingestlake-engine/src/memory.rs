use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use ingestlake_common::Result;

use crate::{DispatchedEvent, EventPersister};

/// In-process stand-in for a durable event log, used by tests and by
/// dev/local runs of the orchestrator and signal evaluator.
#[derive(Default)]
pub struct InMemoryEventLog {
    events: Mutex<Vec<DispatchedEvent>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPersister for InMemoryEventLog {
    async fn persist(&self, event_type: String, payload: serde_json::Value, run_id: &str) -> Result<DispatchedEvent> {
        let mut events = self.events.lock().unwrap();
        let seq = events.len() as i64 + 1;
        let stored = DispatchedEvent {
            seq,
            parent_seq: None,
            event_type,
            payload,
            run_id: run_id.to_string(),
            recorded_at: Utc::now(),
        };
        events.push(stored.clone());
        Ok(stored)
    }

    async fn persist_child(
        &self,
        parent_seq: i64,
        event_type: String,
        payload: serde_json::Value,
        run_id: &str,
    ) -> Result<DispatchedEvent> {
        let mut events = self.events.lock().unwrap();
        let seq = events.len() as i64 + 1;
        let stored = DispatchedEvent {
            seq,
            parent_seq: Some(parent_seq),
            event_type,
            payload,
            run_id: run_id.to_string(),
            recorded_at: Utc::now(),
        };
        events.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl<P: EventPersister + ?Sized> EventPersister for Arc<P> {
    async fn persist(&self, event_type: String, payload: serde_json::Value, run_id: &str) -> Result<DispatchedEvent> {
        (**self).persist(event_type, payload, run_id).await
    }

    async fn persist_child(
        &self,
        parent_seq: i64,
        event_type: String,
        payload: serde_json::Value,
        run_id: &str,
    ) -> Result<DispatchedEvent> {
        (**self).persist_child(parent_seq, event_type, payload, run_id).await
    }
}
