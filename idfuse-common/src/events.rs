//! Event types and EventBus
//!
//! The orchestrator never talks to storage directly. It emits plain records
//! on the bus and moves on; the recorder (or any other subscriber) picks
//! them up asynchronously.

use crate::models::{AccessRecord, ServiceOutcome, ServiceStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Which kind of backend a service call went to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Face verification backend
    Verification,
    /// Question-answering backend
    Context,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Verification => "verification",
            ServiceKind::Context => "context",
        }
    }
}

/// idfuse event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IdfuseEvent {
    /// One verification backend call settled
    ServiceCall {
        request_id: Uuid,
        endpoint: String,
        outcome: ServiceOutcome,
        timestamp: DateTime<Utc>,
    },

    /// The context backend call settled
    ContextCall {
        request_id: Uuid,
        endpoint: String,
        status: ServiceStatus,
        latency_ms: f64,
        payload_size_bytes: u64,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A full "identify and answer" request finished
    RequestCompleted { record: AccessRecord },
}

/// Broadcast bus for [`IdfuseEvent`]
///
/// Cloning is cheap; all clones share one channel. Slow subscribers lag and
/// lose the oldest events rather than blocking producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IdfuseEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<IdfuseEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: IdfuseEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
