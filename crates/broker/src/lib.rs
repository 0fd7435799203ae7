//! AMQP broker client with automatic reconnection.
//!
//! Owns a single long-lived connection plus one channel per publisher
//! and per consumer. When the connection drops, a supervisor task
//! redials with a fixed backoff and re-declares every registered
//! publisher and consumer on fresh channels. Channels from a previous
//! connection generation are never reused.

mod client;
mod consumer;
mod publisher;
mod topology;

pub use client::BrokerClient;
pub use consumer::DeliveryHandler;
pub use publisher::Publisher;
pub use topology::{ExchangeSpec, QueueSpec};

// Re-exported so downstream crates can write delivery handlers
// without a direct lapin dependency.
pub use lapin::message::Delivery;
pub use lapin::options::BasicAckOptions;
pub use lapin::ExchangeKind;

use thiserror::Error;

/// Result type alias for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors surfaced by the broker client
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker cannot be reached right now; safe to retry later.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// A queue, exchange, binding or consume declaration was rejected.
    #[error("topology declaration failed: {0}")]
    Topology(String),

    /// Any other protocol-level failure reported by the AMQP client.
    #[error("broker protocol error: {0}")]
    Protocol(#[from] lapin::Error),
}
