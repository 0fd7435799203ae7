//! Domain entities for the chat core.
//!
//! Pure data models shared by the codec, the store contract and the
//! runtime registries.

pub mod message;
pub mod room;
pub mod user;

pub use message::{Message, MessageKind, MessageStatus};
pub use room::RoomInfo;
pub use user::User;
