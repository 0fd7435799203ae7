//! In-memory store used by tests and single-node deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{Message, RoomInfo, User};
use crate::types::{ChatError, ChatResult};

use super::Store;

/// Hash-map backed [`Store`] implementation.
///
/// Identities are UUIDs assigned on first save. Reads return clones,
/// so callers never observe partially applied mutations.
#[derive(Default)]
pub struct MemoryStore {
    chats: RwLock<HashMap<String, RoomInfo>>,
    messages: RwLock<HashMap<String, Message>>,
    users: RwLock<HashMap<String, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn user_by_id(&self, id: &str) -> ChatResult<User> {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| ChatError::not_found(id))
    }

    fn mutate_message<F>(&self, id: &str, apply: F) -> ChatResult<Message>
    where
        F: FnOnce(&mut Message),
    {
        if id.is_empty() {
            return Err(ChatError::malformed("empty message id"));
        }

        let mut messages = self.messages.write().unwrap_or_else(|e| e.into_inner());
        let message = messages
            .get_mut(id)
            .ok_or_else(|| ChatError::not_found(id))?;
        apply(message);
        Ok(message.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_chats(&self) -> ChatResult<Vec<RoomInfo>> {
        Ok(self
            .chats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect())
    }

    async fn save_chat(&self, room: &mut RoomInfo) -> ChatResult<()> {
        if room.id.is_empty() {
            room.id = Uuid::new_v4().to_string();
        }
        self.chats
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn get_message(&self, id: &str) -> ChatResult<Message> {
        self.messages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| ChatError::not_found(id))
    }

    async fn get_messages(&self, chat_id: &str) -> ChatResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .messages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|message| message.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn save_message(&self, message: &mut Message) -> ChatResult<()> {
        message.author = self.user_by_id(&message.author_id)?;

        if message.id.is_empty() {
            message.id = Uuid::new_v4().to_string();
        } else if !self
            .messages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&message.id)
        {
            return Err(ChatError::not_found(&message.id));
        }

        self.messages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn update_message_content(&self, id: &str, content: &str) -> ChatResult<Message> {
        self.mutate_message(id, |message| message.update_content(content))
    }

    async fn set_hide_message(&self, id: &str, user_id: &str, hidden: bool) -> ChatResult<Message> {
        self.mutate_message(id, |message| message.set_hidden(user_id, hidden))
    }

    async fn delete_message(&self, id: &str) -> ChatResult<Message> {
        self.mutate_message(id, |message| message.delete())
    }

    async fn get_user(&self, name: &str) -> ChatResult<User> {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|user| user.name == name)
            .cloned()
            .ok_or_else(|| ChatError::not_found(name))
    }

    async fn get_user_by_id(&self, id: &str) -> ChatResult<User> {
        self.user_by_id(id)
    }

    async fn create_user(&self, user: &mut User) -> ChatResult<()> {
        if user.id.is_empty() {
            user.id = Uuid::new_v4().to_string();
        }
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user.id.clone(), user.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::MessageKind;

    async fn store_with_user(name: &str) -> (MemoryStore, User) {
        let store = MemoryStore::new();
        let mut user = User::new(name);
        store.create_user(&mut user).await.expect("user should save");
        (store, user)
    }

    #[tokio::test]
    async fn save_message_assigns_id_and_attaches_author() {
        let (store, user) = store_with_user("alice").await;
        let mut message = Message::new("r1", &user.id, "hi", MessageKind::Text);

        store.save_message(&mut message).await.expect("insert should work");

        assert!(!message.id.is_empty());
        assert_eq!(message.author, user);

        let loaded = store.get_message(&message.id).await.expect("message should load");
        assert_eq!(loaded, message);
    }

    #[tokio::test]
    async fn save_message_requires_known_author() {
        let store = MemoryStore::new();
        let mut message = Message::new("r1", "nobody", "hi", MessageKind::Text);

        let error = store
            .save_message(&mut message)
            .await
            .expect_err("unknown author should fail");
        assert!(matches!(error, ChatError::NotFound { .. }));
    }

    #[tokio::test]
    async fn save_message_with_unknown_id_is_not_found() {
        let (store, user) = store_with_user("alice").await;
        let mut message = Message::new("r1", &user.id, "hi", MessageKind::Text);
        message.id = "missing".to_string();

        let error = store
            .save_message(&mut message)
            .await
            .expect_err("update of unknown id should fail");
        assert!(matches!(error, ChatError::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_content_bumps_modified_at() {
        let (store, user) = store_with_user("alice").await;
        let mut message = Message::new("r1", &user.id, "first", MessageKind::Text);
        store.save_message(&mut message).await.unwrap();

        let updated = store
            .update_message_content(&message.id, "second")
            .await
            .expect("update should work");

        assert_eq!(updated.content, "second");
        assert!(updated.modified_at >= updated.created_at);
        assert_eq!(updated.created_at, message.created_at);
    }

    #[tokio::test]
    async fn hide_then_unhide_round_trip() {
        let (store, user) = store_with_user("alice").await;
        let mut message = Message::new("r1", &user.id, "hi", MessageKind::Text);
        store.save_message(&mut message).await.unwrap();

        let hidden = store
            .set_hide_message(&message.id, "u2", true)
            .await
            .expect("hide should work");
        assert!(hidden.is_hidden_for("u2"));

        let shown = store
            .set_hide_message(&message.id, "u2", false)
            .await
            .expect("unhide should work");
        assert!(!shown.is_hidden_for("u2"));
        assert!(shown.hidden_for.is_empty());
    }

    #[tokio::test]
    async fn delete_is_soft() {
        let (store, user) = store_with_user("alice").await;
        let mut message = Message::new("r1", &user.id, "hi", MessageKind::Text);
        store.save_message(&mut message).await.unwrap();

        let deleted = store
            .delete_message(&message.id)
            .await
            .expect("delete should work");

        assert!(deleted.deleted);
        assert_eq!(deleted.content, "hi");

        // Still retrievable after deletion.
        let loaded = store.get_message(&message.id).await.unwrap();
        assert!(loaded.deleted);
    }

    #[tokio::test]
    async fn mutations_on_empty_id_are_malformed() {
        let store = MemoryStore::new();

        let error = store
            .delete_message("")
            .await
            .expect_err("empty id should fail");
        assert!(matches!(error, ChatError::Malformed { .. }));
    }

    #[tokio::test]
    async fn get_messages_filters_by_room_in_order() {
        let (store, user) = store_with_user("alice").await;

        let mut first = Message::new("r1", &user.id, "one", MessageKind::Text);
        store.save_message(&mut first).await.unwrap();
        let mut second = Message::new("r1", &user.id, "two", MessageKind::Text);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.save_message(&mut second).await.unwrap();
        let mut other = Message::new("r2", &user.id, "elsewhere", MessageKind::Text);
        store.save_message(&mut other).await.unwrap();

        let messages = store.get_messages("r1").await.expect("list should work");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "one");
        assert_eq!(messages[1].content, "two");
    }

    #[tokio::test]
    async fn save_chat_assigns_id_once() {
        let store = MemoryStore::new();
        let mut room = RoomInfo::new("general");

        store.save_chat(&mut room).await.expect("insert should work");
        let assigned = room.id.clone();
        assert!(!assigned.is_empty());

        store.save_chat(&mut room).await.expect("update should work");
        assert_eq!(room.id, assigned);
        assert_eq!(store.get_chats().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn user_lookup_by_name_and_id() {
        let (store, user) = store_with_user("alice").await;

        let by_name = store.get_user("alice").await.expect("lookup should work");
        assert_eq!(by_name, user);

        let by_id = store.get_user_by_id(&user.id).await.expect("lookup should work");
        assert_eq!(by_id, user);

        assert!(store.get_user("bob").await.is_err());
    }
}
