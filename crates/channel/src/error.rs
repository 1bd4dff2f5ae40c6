//! Channel session errors

use std::time::Duration;
use thiserror::Error;

/// Errors raised by channel sessions and the relay
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The session was closed locally
    #[error("Session closed")]
    Closed,

    /// Outbound queue is full; the event was not accepted
    #[error("Outbound queue full ({0} events)")]
    Backpressure(usize),

    /// No connection could be established in time
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Path does not name a known channel scope
    #[error("Invalid channel path: {0}")]
    InvalidScope(String),

    /// WebSocket transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Socket-level I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::Transport(err.to_string())
    }
}

/// Result alias for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;
