//! # Crosswire Chats Crate
//!
//! Core of the multi-room chat pipeline: domain entities, the tagged
//! wire-event codec, per-room client bookkeeping, the hub that routes
//! broker deliveries, and the persistence contract.
//!
//! ## Architecture
//!
//! - **Entities**: domain models (Message, User, RoomInfo)
//! - **Types**: errors and the tagged event envelope
//! - **Publish**: the event-publishing seam over the broker
//! - **Store**: persistence contract plus an in-memory implementation
//! - **Room / Hub**: runtime registries and the broker ingress loops

pub mod client;
pub mod entities;
pub mod hub;
pub mod publish;
pub mod room;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, EventData};
pub use entities::{Message, MessageKind, MessageStatus, RoomInfo, User};
pub use hub::{Hub, NOTIFICATION_EXCHANGE, WORK_QUEUE};
pub use publish::{BrokerEventPublisher, EventPublisher, RecordingPublisher, SharedPublisher};
pub use room::Room;
pub use store::{MemoryStore, Store};
pub use types::{
    ChatError, ChatEvent, ChatResult, EventDetails, EventEnvelope, EventKind, MessageChange,
};
