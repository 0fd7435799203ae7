//! The persistence contract the core consumes.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::entities::{Message, RoomInfo, User};
use crate::types::ChatResult;

/// Operations the core requires from the persistence layer.
///
/// Every mutation returns the canonical post-write state. Failures
/// are `Unavailable` (transient, safe to retry — the core does not
/// retry), `NotFound` (no such id) or `Malformed` (id parse failure).
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_chats(&self) -> ChatResult<Vec<RoomInfo>>;

    /// Insert if `room.id` is empty, assigning the identity; update
    /// otherwise.
    async fn save_chat(&self, room: &mut RoomInfo) -> ChatResult<()>;

    async fn get_message(&self, id: &str) -> ChatResult<Message>;

    async fn get_messages(&self, chat_id: &str) -> ChatResult<Vec<Message>>;

    /// Insert if `message.id` is empty, assigning the identity;
    /// update by id otherwise. Resolves and attaches the author.
    async fn save_message(&self, message: &mut Message) -> ChatResult<()>;

    /// Replace the content and bump the modification timestamp
    async fn update_message_content(&self, id: &str, content: &str) -> ChatResult<Message>;

    /// Add or remove `user_id` from the message's hidden set
    async fn set_hide_message(&self, id: &str, user_id: &str, hidden: bool) -> ChatResult<Message>;

    /// Soft-delete; the message keeps its identity and history
    async fn delete_message(&self, id: &str) -> ChatResult<Message>;

    async fn get_user(&self, name: &str) -> ChatResult<User>;

    async fn get_user_by_id(&self, id: &str) -> ChatResult<User>;

    /// Insert if `user.id` is empty, assigning the identity
    async fn create_user(&self, user: &mut User) -> ChatResult<()>;
}
