use tokio::sync::broadcast;

use crate::agent_engine::state::AgentEvent;

const EVENT_CAPACITY: usize = 100;

/// Fan-out of [`AgentEvent`]s to any number of front ends.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// Publishing with nobody listening is not an error.
    pub fn publish(&self, event: AgentEvent) {
        tracing::debug!(?event, "agent event");
        if self.tx.send(event).is_err() {
            tracing::trace!("no event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
