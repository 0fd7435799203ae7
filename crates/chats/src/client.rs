//! The capability surface the core requires from transport sessions.

use async_trait::async_trait;

use crate::entities::{Message, RoomInfo};
use crate::types::{ChatResult, EventKind};

/// Payload handed to a client's event handler
#[derive(Debug, Clone, Default)]
pub struct EventData {
    pub message: Option<Message>,
    pub room: Option<RoomInfo>,
    /// Whether the receiving client is currently focused on the room
    pub connected: bool,
    pub sender_id: String,
}

/// A transport-bound session able to receive rendered updates.
///
/// Implementations live in the transport layer. Handlers may block on
/// I/O and must serialize their own transport writes; a handler
/// failure is logged by the caller and never aborts a broadcast.
#[async_trait]
pub trait Client: Send + Sync {
    /// Stable session identifier
    fn id(&self) -> String;

    /// Handle one typed event
    async fn handle_event(&self, kind: EventKind, data: &EventData) -> ChatResult<()>;
}
