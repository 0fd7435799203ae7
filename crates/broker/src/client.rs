//! Connection ownership and the reconnect supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lapin::{Connection, ConnectionProperties};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time;
use tracing::{error, info};

use crate::consumer::ConsumerSpec;
use crate::{BrokerError, BrokerResult, DeliveryHandler, ExchangeSpec, Publisher, QueueSpec};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Client owning one broker connection and the rebuild list of
/// publishers and consumers installed on it.
pub struct BrokerClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    uri: String,
    connection: RwLock<Connection>,
    publishers: Mutex<Vec<Arc<Publisher>>>,
    consumers: Mutex<Vec<Arc<ConsumerSpec>>>,
    closing: AtomicBool,
    lost: Arc<Notify>,
}

impl BrokerClient {
    /// Establish the initial connection and start the reconnect
    /// supervisor.
    pub async fn dial(uri: &str) -> BrokerResult<Self> {
        let lost = Arc::new(Notify::new());
        let connection = connect(uri, Arc::clone(&lost)).await?;

        let inner = Arc::new(ClientInner {
            uri: uri.to_string(),
            connection: RwLock::new(connection),
            publishers: Mutex::new(Vec::new()),
            consumers: Mutex::new(Vec::new()),
            closing: AtomicBool::new(false),
            lost,
        });

        tokio::spawn(supervise(Arc::clone(&inner)));
        info!(uri, "connected to broker");

        Ok(Self { inner })
    }

    /// Declare `exchanges` on a fresh channel and return a publisher
    /// bound to it. The publisher is added to the supervisor's
    /// rebuild list.
    pub async fn new_publisher(
        &self,
        exchanges: Vec<ExchangeSpec>,
    ) -> BrokerResult<Arc<Publisher>> {
        let publisher = Arc::new(Publisher::new(exchanges));
        {
            let connection = self.inner.connection.read().await;
            publisher.setup(&connection).await?;
        }
        self.inner.publishers.lock().await.push(Arc::clone(&publisher));
        Ok(publisher)
    }

    /// Declare `queue` (and optionally declare `exchange` and bind the
    /// queue to it with `routing_key`), then start consuming,
    /// invoking `handler` for each delivery. The consumer is added to
    /// the supervisor's rebuild list.
    pub async fn register_consumer(
        &self,
        queue: QueueSpec,
        routing_key: impl Into<String>,
        exchange: Option<ExchangeSpec>,
        auto_ack: bool,
        handler: DeliveryHandler,
    ) -> BrokerResult<()> {
        let spec = Arc::new(ConsumerSpec::new(
            queue,
            routing_key.into(),
            exchange,
            auto_ack,
            handler,
        ));
        {
            let connection = self.inner.connection.read().await;
            spec.setup(&connection).await?;
        }
        self.inner.consumers.lock().await.push(spec);
        Ok(())
    }

    /// Close the connection; consumer loops drain and the supervisor
    /// terminates.
    pub async fn close(&self) -> BrokerResult<()> {
        self.inner.closing.store(true, Ordering::SeqCst);
        {
            let connection = self.inner.connection.read().await;
            connection
                .close(200, "client shutdown")
                .await
                .map_err(BrokerError::Protocol)?;
        }
        // Wake the supervisor so it observes the closing flag.
        self.inner.lost.notify_one();
        Ok(())
    }
}

async fn connect(uri: &str, lost: Arc<Notify>) -> BrokerResult<Connection> {
    let connection = Connection::connect(uri, ConnectionProperties::default())
        .await
        .map_err(|error| BrokerError::Unavailable(error.to_string()))?;

    connection.on_error(move |error| {
        error!(%error, "broker connection errored");
        lost.notify_one();
    });

    Ok(connection)
}

/// Waits for a close notification, redials with a fixed backoff, then
/// walks the rebuild list. A rebuild step that fails is logged and
/// skipped; the next reconnect cycle retries it.
async fn supervise(inner: Arc<ClientInner>) {
    loop {
        inner.lost.notified().await;

        if inner.closing.load(Ordering::SeqCst) {
            info!("broker connection closed");
            break;
        }

        // A notification can arrive from a connection generation that
        // was already replaced.
        if inner.connection.read().await.status().connected() {
            continue;
        }

        error!("lost broker connection");
        let connection = loop {
            time::sleep(RECONNECT_DELAY).await;
            if inner.closing.load(Ordering::SeqCst) {
                return;
            }
            match connect(&inner.uri, Arc::clone(&inner.lost)).await {
                Ok(connection) => break connection,
                Err(error) => error!(%error, "broker reconnection failed"),
            }
        };
        info!("reconnected to broker");
        *inner.connection.write().await = connection;

        let connection = inner.connection.read().await;
        for publisher in inner.publishers.lock().await.iter() {
            if let Err(error) = publisher.setup(&connection).await {
                error!(%error, "failed to restore publisher");
            }
        }
        for consumer in inner.consumers.lock().await.iter() {
            if let Err(error) = consumer.setup(&connection).await {
                error!(%error, "failed to restore consumer");
            }
        }
        info!("broker topology restored");
    }
}
