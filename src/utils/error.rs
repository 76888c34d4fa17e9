//! Error types for the relay.
//!
//! Every failure in the relay is either recovered where it happens (a bad
//! frame is skipped, a failed subscriber write is isolated) or ends exactly one
//! connection. Only `Bind` is allowed to stop the process.

use thiserror::Error;

use crate::client::ConnectionId;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound frame could not be understood. The session logs it and keeps reading.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer is gone or the connection was closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// Writing one fan-out frame to one subscriber failed.
    #[error("dispatch to {connection} failed: {reason}")]
    DispatchWriteFailure {
        connection: ConnectionId,
        reason: String,
    },

    /// The broadcast queue has no consumer any more.
    #[error("broadcast queue closed")]
    QueueClosed,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl RelayError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    /// Whether this error means the connection must be torn down.
    pub fn is_fatal_for_connection(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}
