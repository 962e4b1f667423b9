//! Broadcast event bus shared as `Arc<EventBus>` across the server.

use chrono::{DateTime, Utc};
use clinic_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// ClinicEvent
// ---------------------------------------------------------------------------

/// The record an event is about, e.g. `checklist_instance` 42.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: String,
    pub id: DbId,
}

/// Something that happened inside one clinic (or globally, for shared
/// templates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicEvent {
    /// Dot-separated name, e.g. `"checklist.note.requested"`.
    pub event_type: String,
    pub clinic_id: Option<DbId>,
    pub entity: Option<EntityRef>,
    pub actor_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl ClinicEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            clinic_id: None,
            entity: None,
            actor_id: None,
            payload: serde_json::Value::Object(Default::default()),
            occurred_at: Utc::now(),
        }
    }

    pub fn in_clinic(mut self, clinic_id: DbId) -> Self {
        self.clinic_id = Some(clinic_id);
        self
    }

    pub fn about(mut self, kind: impl Into<String>, id: DbId) -> Self {
        self.entity = Some(EntityRef {
            kind: kind.into(),
            id,
        });
        self
    }

    pub fn by(mut self, actor_id: DbId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Override the timestamp, for events reconstructed from another source.
    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out bus: every subscriber sees every event published after it
/// subscribed. Slow receivers lag and lose the oldest events.
pub struct EventBus {
    sender: broadcast::Sender<ClinicEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Returns how many received it;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: ClinicEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::debug!(event_type = %event.event_type, "Event dropped: no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClinicEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Trace every event on the bus until the sender side is dropped.
pub async fn log_events(mut rx: broadcast::Receiver<ClinicEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => tracing::info!(
                event_type = %event.event_type,
                clinic_id = ?event.clinic_id,
                entity_id = ?event.entity.as_ref().map(|e| e.id),
                "Event published"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged behind the bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("Event logger stopped");
}
