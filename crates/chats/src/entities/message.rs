use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;

/// Kind of content a message carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

/// Delivery status of a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sending,
    Sent,
    Error,
}

/// A message within a room.
///
/// A deleted message keeps its identity and history; it is flagged,
/// never physically removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store-assigned identity; empty until first saved
    #[serde(default)]
    pub id: String,
    pub chat_id: String,
    pub author_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub status: MessageStatus,
    /// Users who hid this message from their own view
    #[serde(default)]
    pub hidden_for: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
    /// Resolved author, attached by the store for rendering
    #[serde(default)]
    pub author: User,
}

impl Message {
    /// Create a message about to be sent
    pub fn new(
        chat_id: impl Into<String>,
        author_id: impl Into<String>,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            chat_id: chat_id.into(),
            author_id: author_id.into(),
            content: content.into(),
            kind,
            created_at: now,
            modified_at: now,
            status: MessageStatus::Sending,
            hidden_for: Vec::new(),
            deleted: false,
            author: User::default(),
        }
    }

    /// Replace the content and bump the modification timestamp
    pub fn update_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.modified_at = Utc::now();
    }

    /// Add or remove `user_id` from the hidden set (set semantics)
    pub fn set_hidden(&mut self, user_id: &str, hidden: bool) {
        if hidden {
            if !self.is_hidden_for(user_id) {
                self.hidden_for.push(user_id.to_string());
            }
        } else {
            self.hidden_for.retain(|id| id != user_id);
        }
    }

    pub fn is_hidden_for(&self, user_id: &str) -> bool {
        self.hidden_for.iter().any(|id| id == user_id)
    }

    /// Soft delete; identity and history stay intact
    pub fn delete(&mut self) {
        self.deleted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_defaults() {
        let message = Message::new("r1", "u1", "hi", MessageKind::Text);

        assert!(message.id.is_empty());
        assert_eq!(message.chat_id, "r1");
        assert_eq!(message.author_id, "u1");
        assert_eq!(message.status, MessageStatus::Sending);
        assert_eq!(message.created_at, message.modified_at);
        assert!(message.hidden_for.is_empty());
        assert!(!message.deleted);
    }

    #[test]
    fn update_content_bumps_modification_time() {
        let mut message = Message::new("r1", "u1", "first", MessageKind::Text);

        message.update_content("second");

        assert_eq!(message.content, "second");
        assert!(message.modified_at >= message.created_at);
    }

    #[test]
    fn hidden_set_semantics() {
        let mut message = Message::new("r1", "u1", "hi", MessageKind::Text);

        message.set_hidden("u2", true);
        message.set_hidden("u2", true);
        assert_eq!(message.hidden_for, vec!["u2".to_string()]);
        assert!(message.is_hidden_for("u2"));

        message.set_hidden("u2", false);
        assert!(message.hidden_for.is_empty());
        assert!(!message.is_hidden_for("u2"));
    }

    #[test]
    fn delete_keeps_identity() {
        let mut message = Message::new("r1", "u1", "hi", MessageKind::Text);
        message.id = "m1".to_string();

        message.delete();

        assert!(message.deleted);
        assert_eq!(message.id, "m1");
        assert_eq!(message.content, "hi");
    }

    #[test]
    fn wire_names_are_camel_case() {
        let message = Message::new("r1", "u1", "hi", MessageKind::Image);
        let value = serde_json::to_value(&message).expect("message should serialize");

        assert!(value.get("chatId").is_some());
        assert!(value.get("authorId").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("modifiedAt").is_some());
        assert!(value.get("hiddenFor").is_some());
        assert_eq!(value["kind"], "image");
        assert_eq!(value["status"], "sending");
    }
}
