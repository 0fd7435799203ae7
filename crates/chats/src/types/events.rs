//! Wire events exchanged on the work queue and the notification
//! fanout.
//!
//! The envelope is a JSON object `{type, chatId, userId, details}`
//! where `type` is an integer tag and the shape of `details` depends
//! on it. Producers emit no extra fields; consumers ignore unknown
//! fields, so additive `details` changes are compatible.

use serde::de::{self, Deserializer};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::entities::{Message, MessageKind, MessageStatus, RoomInfo};
use crate::types::{ChatError, ChatResult};

/// Event discriminator; serialized as its integer tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    UpdateMessage,
    EditMessage,
    HideMessage,
    DeleteMessage,
    /// Reserved tag; decoded but not handled anywhere yet
    PinMessage,
    NewChat,
}

impl EventKind {
    pub fn tag(self) -> u8 {
        match self {
            Self::NewMessage => 0,
            Self::UpdateMessage => 1,
            Self::EditMessage => 2,
            Self::HideMessage => 3,
            Self::DeleteMessage => 4,
            Self::PinMessage => 5,
            Self::NewChat => 6,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::NewMessage),
            1 => Some(Self::UpdateMessage),
            2 => Some(Self::EditMessage),
            3 => Some(Self::HideMessage),
            4 => Some(Self::DeleteMessage),
            5 => Some(Self::PinMessage),
            6 => Some(Self::NewChat),
            _ => None,
        }
    }

    /// Name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Self::NewMessage => "new_message",
            Self::UpdateMessage => "update_message",
            Self::EditMessage => "edit_message",
            Self::HideMessage => "hide_message",
            Self::DeleteMessage => "delete_message",
            Self::PinMessage => "pin_message",
            Self::NewChat => "new_chat",
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.tag())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = u8::deserialize(deserializer)?;
        Self::from_tag(tag).ok_or_else(|| de::Error::custom(format!("unknown event tag {tag}")))
    }
}

/// Compact change descriptor carried by every tag except
/// `UpdateMessage` (full message) and `NewChat` (room descriptor).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageChange {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

/// Variant payload of a [`ChatEvent`], selected by the envelope tag
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventDetails {
    Change(MessageChange),
    Message(Message),
    Room(RoomInfo),
}

/// The tagged event envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    pub kind: EventKind,
    pub chat_id: String,
    pub user_id: String,
    pub details: EventDetails,
}

impl ChatEvent {
    pub fn encode(&self) -> ChatResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|error| ChatError::malformed(error.to_string()))
    }

    pub fn decode(body: &[u8]) -> ChatResult<Self> {
        serde_json::from_slice(body).map_err(|error| ChatError::malformed(error.to_string()))
    }
}

impl Serialize for ChatEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ChatEvent", 4)?;
        state.serialize_field("type", &self.kind)?;
        state.serialize_field("chatId", &self.chat_id)?;
        state.serialize_field("userId", &self.user_id)?;
        state.serialize_field("details", &self.details)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ChatEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RawEvent {
            #[serde(rename = "type")]
            kind: EventKind,
            #[serde(rename = "chatId", default)]
            chat_id: String,
            #[serde(rename = "userId", default)]
            user_id: String,
            #[serde(default)]
            details: serde_json::Value,
        }

        let raw = RawEvent::deserialize(deserializer)?;
        let details = match raw.kind {
            EventKind::UpdateMessage => {
                EventDetails::Message(serde_json::from_value(raw.details).map_err(de::Error::custom)?)
            }
            EventKind::NewChat => {
                EventDetails::Room(serde_json::from_value(raw.details).map_err(de::Error::custom)?)
            }
            _ => EventDetails::Change(
                serde_json::from_value(raw.details).map_err(de::Error::custom)?,
            ),
        };

        Ok(Self {
            kind: raw.kind,
            chat_id: raw.chat_id,
            user_id: raw.user_id,
            details,
        })
    }
}

/// Envelope with the payload left raw.
///
/// The ingress loops defer payload decoding: once the work side has
/// swapped the details for the post-write message, notifications
/// carry a full message under any tag.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "chatId", default)]
    pub chat_id: String,
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl EventEnvelope {
    pub fn decode(body: &[u8]) -> ChatResult<Self> {
        serde_json::from_slice(body).map_err(|error| ChatError::malformed(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::User;

    fn change_event() -> ChatEvent {
        ChatEvent {
            kind: EventKind::HideMessage,
            chat_id: "r1".to_string(),
            user_id: "u1".to_string(),
            details: EventDetails::Change(MessageChange {
                id: "m1".to_string(),
                hidden: Some(true),
                ..MessageChange::default()
            }),
        }
    }

    #[test]
    fn tags_cover_declared_range() {
        for tag in 0..=6 {
            let kind = EventKind::from_tag(tag).expect("tag should be known");
            assert_eq!(kind.tag(), tag);
        }
        assert!(EventKind::from_tag(7).is_none());
    }

    #[test]
    fn envelope_wire_shape() {
        let body = change_event().encode().expect("event should encode");
        let value: serde_json::Value =
            serde_json::from_slice(&body).expect("body should be json");

        assert_eq!(value["type"], 3);
        assert_eq!(value["chatId"], "r1");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["details"]["id"], "m1");
        assert_eq!(value["details"]["hidden"], true);
        assert!(value["details"].get("content").is_none());
    }

    #[test]
    fn change_event_round_trip() {
        let event = change_event();
        let body = event.encode().expect("event should encode");
        let decoded = ChatEvent::decode(&body).expect("event should decode");

        assert_eq!(decoded, event);
    }

    #[test]
    fn full_message_round_trip() {
        let mut message = Message::new("r1", "u1", "hi", MessageKind::Text);
        message.id = "m1".to_string();
        message.author = User {
            id: "u1".to_string(),
            name: "alice".to_string(),
        };

        let event = ChatEvent {
            kind: EventKind::UpdateMessage,
            chat_id: "r1".to_string(),
            user_id: "u1".to_string(),
            details: EventDetails::Message(message),
        };

        let body = event.encode().expect("event should encode");
        let decoded = ChatEvent::decode(&body).expect("event should decode");

        assert_eq!(decoded, event);
    }

    #[test]
    fn room_descriptor_round_trip() {
        let event = ChatEvent {
            kind: EventKind::NewChat,
            chat_id: String::new(),
            user_id: String::new(),
            details: EventDetails::Room(RoomInfo::new("general")),
        };

        let body = event.encode().expect("event should encode");
        let decoded = ChatEvent::decode(&body).expect("event should decode");

        assert_eq!(decoded, event);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let body = br#"{"type":42,"chatId":"r1","userId":"u1","details":{}}"#;
        assert!(ChatEvent::decode(body).is_err());
        assert!(EventEnvelope::decode(body).is_err());
    }

    #[test]
    fn truncated_body_is_rejected() {
        assert!(ChatEvent::decode(b"{").is_err());
        assert!(EventEnvelope::decode(b"{").is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let body = br#"{"type":3,"chatId":"r1","userId":"u1","details":{"id":"m1","hidden":true,"extra":"x"},"trace":"abc"}"#;
        let event = ChatEvent::decode(body).expect("extra fields should be ignored");

        assert_eq!(event.kind, EventKind::HideMessage);
        match event.details {
            EventDetails::Change(change) => {
                assert_eq!(change.id, "m1");
                assert_eq!(change.hidden, Some(true));
            }
            details => panic!("unexpected details {details:?}"),
        }
    }

    #[test]
    fn raw_envelope_defers_payload_decoding() {
        // A notification keeps its original tag while carrying the
        // full post-write message.
        let mut message = Message::new("r1", "u1", "hi", MessageKind::Text);
        message.id = "m1".to_string();
        message.status = MessageStatus::Sent;

        let event = ChatEvent {
            kind: EventKind::NewMessage,
            chat_id: "r1".to_string(),
            user_id: "u1".to_string(),
            details: EventDetails::Message(message.clone()),
        };

        let body = event.encode().expect("event should encode");
        let envelope = EventEnvelope::decode(&body).expect("envelope should decode");
        assert_eq!(envelope.kind, EventKind::NewMessage);

        let decoded: Message =
            serde_json::from_value(envelope.details).expect("details should be a message");
        assert_eq!(decoded, message);
    }
}
