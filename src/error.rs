//! Error types for the Scellé session core.

use thiserror::Error;

/// Errors that can occur while coordinating a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to send a message through the channel.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the channel.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// No peer is listening at the given session code.
    #[error("no session found at {0}")]
    PeerUnreachable(String),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires a live connection to the host.
    #[error("not connected to host")]
    NotConnected,

    /// The session loop has already shut down.
    #[error("session closed")]
    SessionClosed,

    /// An operation timed out. Connection establishment is the only
    /// bounded operation in the core.
    #[error("operation timed out")]
    Timeout,

    /// The external narrator collaborator failed. Callers recover with a
    /// fixed fallback string; this variant never propagates out of the
    /// narrator helpers.
    #[error("narrator error: {0}")]
    Narrator(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
