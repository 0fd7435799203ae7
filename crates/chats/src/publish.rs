//! Event-publishing seam between the chat core and the broker.
//!
//! Rooms and the hub publish through the narrow [`EventPublisher`]
//! trait so tests can swap the broker for a recording double.

use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use crosswire_broker::Publisher;
use tokio::sync::RwLock;

use crate::types::{ChatError, ChatEvent, ChatResult, EventKind};

/// Content type stamped on every published body. Bodies are JSON;
/// the wire contract pins this value.
pub const CONTENT_TYPE: &str = "text/plain";

/// Trait for publishing chat events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &ChatEvent) -> ChatResult<()>;
}

/// Publishes events through a broker publisher bound to a fixed
/// exchange and routing key.
pub struct BrokerEventPublisher {
    publisher: Arc<Publisher>,
    exchange: String,
    routing_key: String,
}

impl BrokerEventPublisher {
    pub fn new(
        publisher: Arc<Publisher>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for BrokerEventPublisher {
    async fn publish(&self, event: &ChatEvent) -> ChatResult<()> {
        let body = event.encode()?;
        self.publisher
            .publish(&self.exchange, &self.routing_key, &body, CONTENT_TYPE)
            .await?;
        Ok(())
    }
}

/// Late-bound publisher cell.
///
/// Rooms receive their publish capability at construction, possibly
/// before the broker connection exists. Publishing through an empty
/// cell fails with `Unavailable`.
#[derive(Clone, Default)]
pub struct SharedPublisher {
    slot: Arc<RwLock<Option<Arc<dyn EventPublisher>>>>,
}

impl SharedPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, sink: Arc<dyn EventPublisher>) {
        *self.slot.write().await = Some(sink);
    }
}

#[async_trait]
impl EventPublisher for SharedPublisher {
    async fn publish(&self, event: &ChatEvent) -> ChatResult<()> {
        let sink = self
            .slot
            .read()
            .await
            .clone()
            .ok_or_else(|| ChatError::unavailable("event bus is not connected"))?;
        sink.publish(event).await
    }
}

/// Test double that records published events instead of sending them.
///
/// Lets tests inspect what would have reached the broker without a
/// real connection.
#[derive(Default)]
pub struct RecordingPublisher {
    events: StdRwLock<Vec<ChatEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events in publish order
    pub fn events(&self) -> Vec<ChatEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recorded events with the given kind
    pub fn events_of_kind(&self, kind: EventKind) -> Vec<ChatEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|event| event.kind == kind)
            .cloned()
            .collect()
    }

    /// Check whether any event of the given kind was published
    pub fn was_published(&self, kind: EventKind) -> bool {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|event| event.kind == kind)
    }

    /// Count of recorded events
    pub fn publish_count(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &ChatEvent) -> ChatResult<()> {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}
