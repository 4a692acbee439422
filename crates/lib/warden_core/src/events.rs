//! Outbound domain events.
//!
//! Published after a state change has been persisted. Delivery is
//! fire-and-forget: publishing with no subscribers is not an error.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Channel capacity; slow subscribers observe `Lagged` past this.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AuthEvent {
    AccountUpdated { account_id: Uuid },
    AccountDeleted { account_id: Uuid },
    AuthenticationSuccess { account_id: Uuid },
}

/// Broadcast bus shared by the services.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn publish(&self, event: AuthEvent) {
        if self.tx.send(event).is_err() {
            debug!("event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
