//! Publisher handles bound to their own channel.

use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{BrokerError, BrokerResult, ExchangeSpec};

/// A publisher owning one channel and the exchanges it declares.
///
/// The supervisor swaps the channel for a fresh one after every
/// reconnect; a publish attempted while no healthy channel is
/// installed fails with [`BrokerError::Unavailable`].
pub struct Publisher {
    exchanges: Vec<ExchangeSpec>,
    channel: RwLock<Option<Channel>>,
}

impl Publisher {
    pub(crate) fn new(exchanges: Vec<ExchangeSpec>) -> Self {
        Self {
            exchanges,
            channel: RwLock::new(None),
        }
    }

    /// Open a channel on `connection` and re-declare the exchanges.
    pub(crate) async fn setup(&self, connection: &Connection) -> BrokerResult<()> {
        let channel = connection.create_channel().await?;

        for exchange in &self.exchanges {
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
        }

        *self.channel.write().await = Some(channel);
        Ok(())
    }

    /// Deliver one message on the current channel.
    ///
    /// No client-side buffering: during a reconnect window this fails
    /// and the caller decides whether to retry.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        content_type: &str,
    ) -> BrokerResult<()> {
        let guard = self.channel.read().await;
        let channel = guard
            .as_ref()
            .filter(|channel| channel.status().connected())
            .ok_or_else(|| BrokerError::Unavailable("publisher channel is not open".to_string()))?;

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_content_type(content_type.into()),
            )
            .await
            .map_err(|error| BrokerError::Unavailable(error.to_string()))?;

        debug!(exchange, routing_key, bytes = body.len(), "published message");
        Ok(())
    }
}
