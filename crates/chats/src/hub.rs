//! Room registry, client tracking and the broker ingress loops.
//!
//! The hub is the only component that knows every room in the
//! process, tracks every client's current room, and translates broker
//! deliveries into room broadcasts.

use std::collections::HashMap;
use std::sync::Arc;

use crosswire_broker::{
    BasicAckOptions, BrokerClient, Delivery, DeliveryHandler, ExchangeSpec, QueueSpec,
};
use crosswire_config::BrokerConfig;
use futures_util::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::client::{Client, EventData};
use crate::entities::{Message, MessageStatus, RoomInfo};
use crate::publish::{BrokerEventPublisher, EventPublisher, SharedPublisher};
use crate::room::Room;
use crate::store::Store;
use crate::types::{
    ChatError, ChatEvent, ChatResult, EventDetails, EventEnvelope, EventKind, MessageChange,
};

/// Durable queue carrying write-side events; consumed by one worker
/// per instance
pub const WORK_QUEUE: &str = "chat_messages";

/// Durable fanout exchange broadcasting post-write notifications to
/// every instance
pub const NOTIFICATION_EXCHANGE: &str = "chat_notifications";

/// Per-client record: the session handle and the room it currently
/// views (empty when the client is not focused on any room).
struct ClientMeta {
    client: Arc<dyn Client>,
    current_room: String,
}

/// The in-process registry of rooms and client sessions.
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    store: Arc<dyn Store>,
    // Lock order: `clients` before `rooms` whenever both are needed.
    clients: Mutex<HashMap<String, ClientMeta>>,
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    events: SharedPublisher,
    notifications: SharedPublisher,
    broker: Mutex<Option<BrokerClient>>,
}

impl Hub {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                store,
                clients: Mutex::new(HashMap::new()),
                rooms: Mutex::new(HashMap::new()),
                events: SharedPublisher::new(),
                notifications: SharedPublisher::new(),
                broker: Mutex::new(None),
            }),
        }
    }

    /// Dial the broker, assert the fixed topology and start both
    /// consumers: the work-side consumer on the shared durable queue
    /// and the notification-side consumer on a per-instance exclusive
    /// queue bound to the fanout.
    pub async fn start(&self, config: &BrokerConfig) -> ChatResult<()> {
        let broker = BrokerClient::dial(&config.url).await?;

        // Write events travel on the default exchange, routed by the
        // work queue name.
        let work = broker.new_publisher(Vec::new()).await?;
        let fanout = broker
            .new_publisher(vec![ExchangeSpec::fanout(NOTIFICATION_EXCHANGE)])
            .await?;

        self.install_publishers(
            Arc::new(BrokerEventPublisher::new(work, "", WORK_QUEUE)),
            Arc::new(BrokerEventPublisher::new(fanout, NOTIFICATION_EXCHANGE, "")),
        )
        .await;

        let inner = Arc::clone(&self.inner);
        let work_handler: DeliveryHandler = Arc::new(move |delivery: Delivery| {
            let inner = Arc::clone(&inner);
            async move { inner.consume_work(delivery).await }.boxed()
        });
        broker
            .register_consumer(QueueSpec::durable(WORK_QUEUE), "", None, false, work_handler)
            .await?;

        let inner = Arc::clone(&self.inner);
        let notification_handler: DeliveryHandler = Arc::new(move |delivery: Delivery| {
            let inner = Arc::clone(&inner);
            async move { inner.apply_notification(&delivery.data).await }.boxed()
        });
        broker
            .register_consumer(
                QueueSpec::ephemeral(),
                "",
                Some(ExchangeSpec::fanout(NOTIFICATION_EXCHANGE)),
                true,
                notification_handler,
            )
            .await?;

        *self.inner.broker.lock().await = Some(broker);
        info!("hub connected to broker");
        Ok(())
    }

    /// Swap in the event sinks used by rooms and the republish path.
    ///
    /// `start` installs the broker-backed sinks; tests and alternative
    /// transports install their own.
    pub async fn install_publishers(
        &self,
        events: Arc<dyn EventPublisher>,
        notifications: Arc<dyn EventPublisher>,
    ) {
        self.inner.events.set(events).await;
        self.inner.notifications.set(notifications).await;
    }

    /// Populate the room registry from the store
    pub async fn load_chats_from_store(&self) -> ChatResult<()> {
        let infos = self.inner.store.get_chats().await?;
        let mut rooms = self.inner.rooms.lock().await;
        for info in infos {
            let room = self.inner.build_room(info);
            rooms.insert(room.id().to_string(), room);
        }
        Ok(())
    }

    pub async fn get_chats(&self) -> Vec<Arc<Room>> {
        self.inner.rooms.lock().await.values().cloned().collect()
    }

    pub async fn get_chat(&self, chat_id: &str) -> Option<Arc<Room>> {
        self.inner.rooms.lock().await.get(chat_id).cloned()
    }

    /// Publish a `NewChat` write event; the work-side consumer is
    /// responsible for persisting and registering the room.
    pub async fn add_chat(&self, name: &str) -> ChatResult<()> {
        let event = ChatEvent {
            kind: EventKind::NewChat,
            chat_id: String::new(),
            user_id: String::new(),
            details: EventDetails::Room(RoomInfo::new(name)),
        };
        self.inner.events.publish(&event).await
    }

    /// Focus `client` on `room_id`, returning the room it joined and
    /// the room it left.
    ///
    /// The empty string means "initial connection": the client is
    /// placed into the disconnected set of every known room.
    pub async fn connect_client(
        &self,
        room_id: &str,
        client: Arc<dyn Client>,
    ) -> ChatResult<(Option<Arc<Room>>, Option<Arc<Room>>)> {
        let client_id = client.id();
        if client_id.is_empty() {
            return Err(ChatError::invalid_argument(
                "client identity must not be empty",
            ));
        }

        let mut clients = self.inner.clients.lock().await;
        let rooms = self.inner.rooms.lock().await;

        let meta = clients.entry(client_id).or_insert_with(|| ClientMeta {
            client: Arc::clone(&client),
            current_room: String::new(),
        });

        let mut previous = None;
        if meta.current_room != room_id {
            if let Some(room) = rooms.get(&meta.current_room) {
                room.disconnect_client(Arc::clone(&client)).await;
                previous = Some(Arc::clone(room));
            }
        }

        if room_id.is_empty() {
            for room in rooms.values() {
                room.disconnect_client(Arc::clone(&client)).await;
            }
            meta.current_room = String::new();
            return Ok((None, previous));
        }

        if let Some(room) = rooms.get(room_id) {
            room.connect_client(Arc::clone(&client)).await;
            meta.current_room = room_id.to_string();
            return Ok((Some(Arc::clone(room)), previous));
        }

        Ok((None, previous))
    }

    /// Move the client out of its current room but keep its record;
    /// it may refocus later.
    pub async fn disconnect_client(&self, client: &Arc<dyn Client>) {
        let clients = self.inner.clients.lock().await;
        let rooms = self.inner.rooms.lock().await;

        if let Some(meta) = clients.get(&client.id()) {
            if let Some(room) = rooms.get(&meta.current_room) {
                room.disconnect_client(Arc::clone(client)).await;
            }
        }
    }

    /// Drop the client's record and erase it from every room
    pub async fn remove_client(&self, client: &Arc<dyn Client>) {
        let mut clients = self.inner.clients.lock().await;
        let rooms = self.inner.rooms.lock().await;

        let client_id = client.id();
        clients.remove(&client_id);
        for room in rooms.values() {
            room.remove_client(&client_id).await;
        }
    }

    /// Room the client currently views, if the client is known
    pub async fn current_room(&self, client_id: &str) -> Option<String> {
        self.inner
            .clients
            .lock()
            .await
            .get(client_id)
            .map(|meta| meta.current_room.clone())
    }

    /// Work-side consumer body for one raw delivery: apply the store
    /// mutation and return the notification to fan out, if any.
    pub async fn process_work_delivery(&self, body: &[u8]) -> Option<ChatEvent> {
        self.inner.apply_work(body).await
    }

    /// Notification-side consumer body for one raw delivery
    pub async fn process_notification(&self, body: &[u8]) {
        self.inner.apply_notification(body).await
    }

    /// Close the broker connection; both consumer loops drain and
    /// exit.
    pub async fn close(&self) -> ChatResult<()> {
        if let Some(broker) = self.inner.broker.lock().await.take() {
            broker.close().await?;
        }
        Ok(())
    }
}

impl HubInner {
    fn build_room(&self, info: RoomInfo) -> Arc<Room> {
        Arc::new(Room::new(
            info,
            Arc::clone(&self.store),
            Arc::new(self.events.clone()),
        ))
    }

    async fn register_room(&self, info: RoomInfo) -> Arc<Room> {
        let room = self.build_room(info);
        self.rooms
            .lock()
            .await
            .insert(room.id().to_string(), Arc::clone(&room));
        room
    }

    /// Deliver a `NewChat` event to every known client. This is the
    /// only place events reach clients outside a room broadcast.
    async fn notify_new_chat(&self, info: &RoomInfo) {
        let data = EventData {
            room: Some(info.clone()),
            ..EventData::default()
        };

        let clients = self.clients.lock().await;
        for meta in clients.values() {
            if let Err(error) = meta.client.handle_event(EventKind::NewChat, &data).await {
                warn!(client = %meta.client.id(), %error, "client handler failed");
            }
        }
    }

    /// One work-queue delivery. The delivery is acked on any outcome
    /// before the notification goes out, so an undeliverable
    /// notification never re-runs the store mutation.
    async fn consume_work(&self, delivery: Delivery) {
        debug!(bytes = delivery.data.len(), "received work delivery");
        let notification = self.apply_work(&delivery.data).await;

        if let Err(error) = delivery.ack(BasicAckOptions::default()).await {
            warn!(%error, "failed to ack work delivery");
        }

        if let Some(event) = notification {
            if let Err(error) = self.notifications.publish(&event).await {
                error!(%error, "failed to publish notification");
            }
        }
    }

    /// Apply the store mutation for one write event and build the
    /// notification to republish: the original tag with `details`
    /// replaced by the full post-write message.
    async fn apply_work(&self, body: &[u8]) -> Option<ChatEvent> {
        let envelope = match EventEnvelope::decode(body) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "discarding undecodable work delivery");
                return None;
            }
        };

        match envelope.kind {
            EventKind::NewChat => {
                let mut info: RoomInfo = match serde_json::from_value(envelope.details) {
                    Ok(info) => info,
                    Err(error) => {
                        warn!(%error, "discarding malformed room descriptor");
                        return None;
                    }
                };

                if let Err(error) = self.store.save_chat(&mut info).await {
                    error!(%error, "failed to persist new chat");
                    return None;
                }

                let room = self.register_room(info.clone()).await;
                info!(chat = room.id(), name = room.name(), "registered new chat");
                self.notify_new_chat(&info).await;

                Some(ChatEvent {
                    kind: EventKind::NewChat,
                    chat_id: info.id.clone(),
                    user_id: envelope.user_id,
                    details: EventDetails::Room(info),
                })
            }
            EventKind::UpdateMessage => {
                let mut message: Message = match serde_json::from_value(envelope.details) {
                    Ok(message) => message,
                    Err(error) => {
                        warn!(%error, "discarding malformed message payload");
                        return None;
                    }
                };

                if let Err(error) = self.store.save_message(&mut message).await {
                    error!(%error, "failed to save message");
                    return None;
                }

                Some(ChatEvent {
                    kind: EventKind::UpdateMessage,
                    chat_id: envelope.chat_id,
                    user_id: envelope.user_id,
                    details: EventDetails::Message(message),
                })
            }
            EventKind::PinMessage => {
                warn!(chat = %envelope.chat_id, "pin events are not handled");
                None
            }
            EventKind::NewMessage
            | EventKind::EditMessage
            | EventKind::HideMessage
            | EventKind::DeleteMessage => {
                let change: MessageChange = match serde_json::from_value(envelope.details) {
                    Ok(change) => change,
                    Err(error) => {
                        warn!(%error, "discarding malformed change descriptor");
                        return None;
                    }
                };

                let result = match envelope.kind {
                    EventKind::NewMessage => {
                        let mut message = Message::new(
                            &envelope.chat_id,
                            &envelope.user_id,
                            change.content.clone().unwrap_or_default(),
                            change.kind.unwrap_or_default(),
                        );
                        message.status = MessageStatus::Sent;
                        self.store.save_message(&mut message).await.map(|()| message)
                    }
                    EventKind::EditMessage => {
                        self.store
                            .update_message_content(
                                &change.id,
                                change.content.as_deref().unwrap_or_default(),
                            )
                            .await
                    }
                    EventKind::HideMessage => {
                        self.store
                            .set_hide_message(
                                &change.id,
                                &envelope.user_id,
                                change.hidden.unwrap_or_default(),
                            )
                            .await
                    }
                    _ => self.store.delete_message(&change.id).await,
                };

                match result {
                    Ok(message) => Some(ChatEvent {
                        kind: envelope.kind,
                        chat_id: envelope.chat_id,
                        user_id: envelope.user_id,
                        details: EventDetails::Message(message),
                    }),
                    Err(error) => {
                        error!(%error, kind = envelope.kind.name(), "failed to apply write event");
                        None
                    }
                }
            }
        }
    }

    /// Notification-side consumer body. Deliveries are auto-acked; a
    /// missed notification never corrupts persistent state.
    async fn apply_notification(&self, body: &[u8]) {
        let envelope = match EventEnvelope::decode(body) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "discarding undecodable notification");
                return;
            }
        };

        if envelope.kind == EventKind::NewChat {
            let info: RoomInfo = match serde_json::from_value(envelope.details) {
                Ok(info) => info,
                Err(error) => {
                    warn!(%error, "discarding malformed room descriptor");
                    return;
                }
            };
            self.register_room(info.clone()).await;
            self.notify_new_chat(&info).await;
            return;
        }

        // Release the registry lock before broadcasting.
        let room = {
            let rooms = self.rooms.lock().await;
            rooms.get(&envelope.chat_id).cloned()
        };
        let Some(room) = room else {
            debug!(chat = %envelope.chat_id, "room not hosted here, skipping notification");
            return;
        };

        let message: Message = match serde_json::from_value(envelope.details) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "discarding malformed message payload");
                return;
            }
        };

        let data = EventData {
            message: Some(message),
            room: Some(room.info()),
            connected: false,
            sender_id: envelope.user_id,
        };
        room.broadcast(envelope.kind, data).await;
    }
}
