//! Consumer registration and the per-consumer delivery loop.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::Connection;
use tracing::{debug, warn};

use crate::{BrokerError, BrokerResult, ExchangeSpec, QueueSpec};

/// Callback invoked for every delivery a consumer receives
pub type DeliveryHandler = Arc<dyn Fn(Delivery) -> BoxFuture<'static, ()> + Send + Sync>;

/// Everything needed to (re)install a consumer on a fresh connection
pub(crate) struct ConsumerSpec {
    queue: QueueSpec,
    routing_key: String,
    exchange: Option<ExchangeSpec>,
    auto_ack: bool,
    handler: DeliveryHandler,
}

impl ConsumerSpec {
    pub(crate) fn new(
        queue: QueueSpec,
        routing_key: String,
        exchange: Option<ExchangeSpec>,
        auto_ack: bool,
        handler: DeliveryHandler,
    ) -> Self {
        Self {
            queue,
            routing_key,
            exchange,
            auto_ack,
            handler,
        }
    }

    /// Open a channel, declare the topology and start the delivery
    /// loop. The loop ends when the channel closes, which happens on
    /// connection loss and on shutdown.
    pub(crate) async fn setup(&self, connection: &Connection) -> BrokerResult<()> {
        debug!(queue = %self.queue.name, "creating consumer channel");
        let channel = connection.create_channel().await?;

        let queue = channel
            .queue_declare(
                &self.queue.name,
                QueueDeclareOptions {
                    durable: self.queue.durable,
                    exclusive: self.queue.exclusive,
                    auto_delete: self.queue.auto_delete,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|error| BrokerError::Topology(format!("queue {}: {error}", self.queue.name)))?;

        // Absent an exchange the queue listens on the default exchange.
        if let Some(exchange) = &self.exchange {
            channel
                .exchange_declare(
                    &exchange.name,
                    exchange.kind.clone(),
                    ExchangeDeclareOptions {
                        durable: exchange.durable,
                        auto_delete: exchange.auto_delete,
                        internal: exchange.internal,
                        ..ExchangeDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|error| {
                    BrokerError::Topology(format!("exchange {}: {error}", exchange.name))
                })?;

            channel
                .queue_bind(
                    queue.name().as_str(),
                    &exchange.name,
                    &self.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|error| {
                    BrokerError::Topology(format!(
                        "binding {} to {}: {error}",
                        queue.name(),
                        exchange.name
                    ))
                })?;
        }

        let mut deliveries = channel
            .basic_consume(
                queue.name().as_str(),
                "",
                BasicConsumeOptions {
                    no_ack: self.auto_ack,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|error| {
                BrokerError::Topology(format!("consume on {}: {error}", queue.name()))
            })?;

        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            while let Some(delivery) = deliveries.next().await {
                match delivery {
                    Ok(delivery) => handler(delivery).await,
                    Err(error) => warn!(%error, "delivery stream errored"),
                }
            }
            debug!("consumer channel closed");
        });

        Ok(())
    }
}
