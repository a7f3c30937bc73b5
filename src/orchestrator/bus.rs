//! Event bus
//!
//! Lets background loops announce what they did without depending on who
//! listens. Publishing never blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// An event published on the bus, serialized as `{"type": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Why an event was not delivered
#[derive(Debug, Error)]
pub enum BusError {
    #[error("no subscribers for event {0}")]
    NoSubscribers(String),
}

/// Publish side of a message bus
pub trait EventBus: Send + Sync {
    /// Publish an event; returns how many subscribers received it
    fn publish(&self, event: BusEvent) -> Result<usize, BusError>;
}

/// In-process bus backed by a tokio broadcast channel
#[derive(Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<BusEvent>,
}

impl BroadcastBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, event: BusEvent) -> Result<usize, BusError> {
        let event_type = event.event_type.clone();
        self.tx
            .send(event)
            .map_err(|_| BusError::NoSubscribers(event_type))
    }
}
