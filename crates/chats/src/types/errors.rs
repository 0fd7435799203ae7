//! Error types for the chat core.

use thiserror::Error;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Main error type for the chat core
#[derive(Debug, Error)]
pub enum ChatError {
    /// Broker or store temporarily unreachable; safe to retry
    #[error("unavailable: {reason}")]
    Unavailable { reason: String },

    /// An identifier did not resolve
    #[error("not found: {id}")]
    NotFound { id: String },

    /// Undecodable payload or unparsable identifier
    #[error("malformed: {message}")]
    Malformed { message: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Unrecoverable startup failure
    #[error("fatal: {message}")]
    Fatal { message: String },
}

impl ChatError {
    /// Create an unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a malformed error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a fatal error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }
}

impl From<crosswire_broker::BrokerError> for ChatError {
    fn from(error: crosswire_broker::BrokerError) -> Self {
        match error {
            crosswire_broker::BrokerError::Unavailable(reason) => Self::Unavailable { reason },
            crosswire_broker::BrokerError::Topology(message) => Self::Fatal { message },
            crosswire_broker::BrokerError::Protocol(error) => Self::Unavailable {
                reason: error.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed {
            message: error.to_string(),
        }
    }
}
