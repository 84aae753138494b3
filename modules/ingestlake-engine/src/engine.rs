use std::collections::VecDeque;
use std::marker::PhantomData;

use ingestlake_common::Result;

use crate::traits::{EventLike, EventPersister, Reducer, Router};

/// Generic stage-dispatch engine.
///
/// Persist → reduce → route → recurse until settled. Causal chaining is
/// automatic: child events reference their trigger's sequence number. This
/// drives the orchestrator's run lifecycle (spec §4.3) and the signal
/// evaluator's per-definition reconciliation loop (spec §4.5) against the
/// same dispatch code.
pub struct Engine<E, S, D, Red, Rout, P>
where
    E: EventLike,
    S: Send,
    D: Send + Sync,
    Red: Reducer<E, S>,
    Rout: Router<E, S, D>,
    P: EventPersister,
{
    reducer: Red,
    router: Rout,
    persister: P,
    run_id: String,
    _phantom: PhantomData<fn() -> (E, S, D)>,
}

impl<E, S, D, Red, Rout, P> Engine<E, S, D, Red, Rout, P>
where
    E: EventLike,
    S: Send,
    D: Send + Sync,
    Red: Reducer<E, S>,
    Rout: Router<E, S, D>,
    P: EventPersister,
{
    pub fn new(reducer: Red, router: Rout, persister: P, run_id: String) -> Self {
        Self {
            reducer,
            router,
            persister,
            run_id,
            _phantom: PhantomData,
        }
    }

    pub async fn dispatch(&self, event: E, state: &mut S, deps: &D) -> Result<()> {
        let mut queue: VecDeque<(E, Option<i64>)> = VecDeque::new();
        queue.push_back((event, None));

        while let Some((evt, parent_seq)) = queue.pop_front() {
            let stored = match parent_seq {
                None => {
                    self.persister
                        .persist(evt.event_type_str(), evt.to_persist_payload(), &self.run_id)
                        .await?
                }
                Some(parent) => {
                    self.persister
                        .persist_child(parent, evt.event_type_str(), evt.to_persist_payload(), &self.run_id)
                        .await?
                }
            };

            self.reducer.reduce(state, &evt);

            let children = self.router.route(&evt, &stored, state, deps).await?;

            for child in children {
                queue.push_back((child, Some(stored.seq)));
            }
        }

        Ok(())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}
