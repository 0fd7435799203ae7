//! Per-room client bookkeeping and the publish side of the event bus.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::client::{Client, EventData};
use crate::entities::{Message, RoomInfo};
use crate::publish::EventPublisher;
use crate::store::Store;
use crate::types::{ChatEvent, ChatResult, EventDetails, EventKind, MessageChange};

/// A room: the clients watching it plus the publish helpers that turn
/// user actions into write events.
///
/// The room never persists state and never delivers to its clients on
/// a write path; delivery happens only through the hub's broker
/// ingress calling [`Room::broadcast`].
pub struct Room {
    info: RoomInfo,
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
    clients: Mutex<ClientSets>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room").field("info", &self.info).finish()
    }
}

/// Both sets live under one lock, so a client is never observed in
/// both at once and a broadcast runs against a consistent snapshot.
#[derive(Default)]
struct ClientSets {
    connected: HashMap<String, Arc<dyn Client>>,
    disconnected: HashMap<String, Arc<dyn Client>>,
}

impl Room {
    pub(crate) fn new(
        info: RoomInfo,
        store: Arc<dyn Store>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            info,
            store,
            publisher,
            clients: Mutex::new(ClientSets::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Persisted descriptor of this room
    pub fn info(&self) -> RoomInfo {
        self.info.clone()
    }

    /// Move `client` into the connected set
    pub async fn connect_client(&self, client: Arc<dyn Client>) {
        let mut clients = self.clients.lock().await;
        let id = client.id();
        clients.disconnected.remove(&id);
        clients.connected.insert(id, client);
    }

    /// Move `client` into the disconnected set
    pub async fn disconnect_client(&self, client: Arc<dyn Client>) {
        let mut clients = self.clients.lock().await;
        let id = client.id();
        clients.connected.remove(&id);
        clients.disconnected.insert(id, client);
    }

    /// Erase the client from both sets
    pub async fn remove_client(&self, client_id: &str) {
        let mut clients = self.clients.lock().await;
        clients.connected.remove(client_id);
        clients.disconnected.remove(client_id);
    }

    pub async fn has_connected(&self, client_id: &str) -> bool {
        self.clients.lock().await.connected.contains_key(client_id)
    }

    pub async fn has_disconnected(&self, client_id: &str) -> bool {
        self.clients
            .lock()
            .await
            .disconnected
            .contains_key(client_id)
    }

    /// Messages of this room, straight from the store
    pub async fn messages(&self) -> ChatResult<Vec<Message>> {
        self.store.get_messages(&self.info.id).await
    }

    /// Publish a write event announcing `message`
    pub async fn new_message(&self, message: &Message, author_id: &str) -> ChatResult<()> {
        let details = MessageChange {
            id: message.id.clone(),
            content: Some(message.content.clone()),
            kind: Some(message.kind),
            status: Some(message.status),
            hidden: None,
            deleted: Some(message.deleted),
        };
        self.publish(EventKind::NewMessage, author_id, EventDetails::Change(details))
            .await
    }

    /// Publish the full message as an upsert
    pub async fn update_message(&self, message: &Message, user_id: &str) -> ChatResult<()> {
        self.publish(
            EventKind::UpdateMessage,
            user_id,
            EventDetails::Message(message.clone()),
        )
        .await
    }

    /// Publish a content edit for the message with `id`
    pub async fn update_message_content(&self, id: &str, content: &str) -> ChatResult<()> {
        let details = MessageChange {
            id: id.to_string(),
            content: Some(content.to_string()),
            ..MessageChange::default()
        };
        self.publish(EventKind::EditMessage, "", EventDetails::Change(details))
            .await
    }

    /// Publish a hide/unhide of the message with `id` for `user_id`
    pub async fn set_hide_message(&self, id: &str, user_id: &str, hide: bool) -> ChatResult<()> {
        let details = MessageChange {
            id: id.to_string(),
            hidden: Some(hide),
            ..MessageChange::default()
        };
        self.publish(EventKind::HideMessage, user_id, EventDetails::Change(details))
            .await
    }

    /// Publish a soft delete of the message with `id`
    pub async fn delete_message(&self, id: &str) -> ChatResult<()> {
        let details = MessageChange {
            id: id.to_string(),
            deleted: Some(true),
            ..MessageChange::default()
        };
        self.publish(EventKind::DeleteMessage, "", EventDetails::Change(details))
            .await
    }

    async fn publish(
        &self,
        kind: EventKind,
        user_id: &str,
        details: EventDetails,
    ) -> ChatResult<()> {
        let event = ChatEvent {
            kind,
            chat_id: self.info.id.clone(),
            user_id: user_id.to_string(),
            details,
        };
        self.publisher.publish(&event).await
    }

    /// Deliver `kind`/`data` to every client of this room.
    ///
    /// The client lock is held for the whole pass. A failing handler
    /// is logged and the iteration continues.
    pub async fn broadcast(&self, kind: EventKind, mut data: EventData) {
        let clients = self.clients.lock().await;

        data.connected = true;
        for client in clients.connected.values() {
            if let Err(error) = client.handle_event(kind, &data).await {
                warn!(client = %client.id(), %error, "client handler failed");
            }
        }

        data.connected = false;
        for client in clients.disconnected.values() {
            if let Err(error) = client.handle_event(kind, &data).await {
                warn!(client = %client.id(), %error, "client handler failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::entities::{MessageKind, User};
    use crate::publish::RecordingPublisher;
    use crate::store::MemoryStore;
    use crate::types::ChatError;

    struct TestClient {
        id: String,
        failing: bool,
        events: StdMutex<Vec<(EventKind, EventData)>>,
    }

    impl TestClient {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                failing: false,
                events: StdMutex::new(Vec::new()),
            })
        }

        fn failing(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                failing: true,
                events: StdMutex::new(Vec::new()),
            })
        }

        fn events(&self) -> Vec<(EventKind, EventData)> {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl Client for TestClient {
        fn id(&self) -> String {
            self.id.clone()
        }

        async fn handle_event(&self, kind: EventKind, data: &EventData) -> ChatResult<()> {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((kind, data.clone()));
            if self.failing {
                return Err(ChatError::unavailable("transport gone"));
            }
            Ok(())
        }
    }

    fn test_room(publisher: Arc<RecordingPublisher>) -> Room {
        let info = RoomInfo {
            id: "r1".to_string(),
            name: "general".to_string(),
        };
        Room::new(info, Arc::new(MemoryStore::new()), publisher)
    }

    #[tokio::test]
    async fn client_connection_flow() {
        let room = test_room(Arc::new(RecordingPublisher::new()));
        let client = TestClient::new("c1");

        room.connect_client(client.clone()).await;
        assert!(room.has_connected("c1").await);
        assert!(!room.has_disconnected("c1").await);

        room.disconnect_client(client.clone()).await;
        assert!(!room.has_connected("c1").await);
        assert!(room.has_disconnected("c1").await);

        room.connect_client(client.clone()).await;
        assert!(room.has_connected("c1").await);
        assert!(!room.has_disconnected("c1").await);

        room.remove_client("c1").await;
        assert!(!room.has_connected("c1").await);
        assert!(!room.has_disconnected("c1").await);
    }

    #[tokio::test]
    async fn broadcast_flags_connected_state() {
        let room = test_room(Arc::new(RecordingPublisher::new()));

        let connected = TestClient::new("connected");
        room.connect_client(connected.clone()).await;

        let disconnected = TestClient::new("disconnected");
        room.connect_client(disconnected.clone()).await;
        room.disconnect_client(disconnected.clone()).await;

        let message = Message::new("r1", "u1", "hi", MessageKind::Text);
        let data = EventData {
            message: Some(message),
            room: Some(room.info()),
            connected: false,
            sender_id: "u1".to_string(),
        };
        room.broadcast(EventKind::NewMessage, data).await;

        let events = connected.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].1.connected);

        let events = disconnected.events();
        assert_eq!(events.len(), 1);
        assert!(!events[0].1.connected);
    }

    #[tokio::test]
    async fn failing_handler_does_not_abort_broadcast() {
        let room = test_room(Arc::new(RecordingPublisher::new()));

        room.connect_client(TestClient::failing("bad")).await;
        let healthy = TestClient::new("good");
        room.connect_client(healthy.clone()).await;

        room.broadcast(EventKind::NewMessage, EventData::default())
            .await;

        assert_eq!(healthy.events().len(), 1);
    }

    #[tokio::test]
    async fn publish_helpers_emit_write_events() {
        let publisher = Arc::new(RecordingPublisher::new());
        let room = test_room(publisher.clone());

        let mut message = Message::new("r1", "u1", "hi", MessageKind::Text);
        message.author = User {
            id: "u1".to_string(),
            name: "alice".to_string(),
        };

        room.new_message(&message, "u1").await.unwrap();
        room.update_message(&message, "u1").await.unwrap();
        room.update_message_content("m1", "edited").await.unwrap();
        room.set_hide_message("m1", "u2", true).await.unwrap();
        room.delete_message("m1").await.unwrap();

        let events = publisher.events();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|event| event.chat_id == "r1"));

        assert_eq!(events[0].kind, EventKind::NewMessage);
        match &events[0].details {
            EventDetails::Change(change) => {
                assert_eq!(change.content.as_deref(), Some("hi"));
                assert_eq!(change.kind, Some(MessageKind::Text));
            }
            details => panic!("unexpected details {details:?}"),
        }

        assert_eq!(events[1].kind, EventKind::UpdateMessage);
        assert!(matches!(&events[1].details, EventDetails::Message(m) if m.content == "hi"));

        assert_eq!(events[2].kind, EventKind::EditMessage);
        assert_eq!(events[3].kind, EventKind::HideMessage);
        assert_eq!(events[3].user_id, "u2");
        assert_eq!(events[4].kind, EventKind::DeleteMessage);

        // Every published event survives the codec unchanged.
        for event in &events {
            let body = event.encode().expect("event should encode");
            let decoded = ChatEvent::decode(&body).expect("event should decode");
            assert_eq!(&decoded, event);
        }
    }
}
