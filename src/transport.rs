//! Transport abstraction for session coordination.
//!
//! The protocol needs two things from a transport: a reliable, ordered,
//! bidirectional text-message [`Channel`] between two terminals, and a
//! host-side [`Endpoint`] that owns a shareable address (the session
//! code) and accepts inbound channels.
//!
//! Connection setup is intentionally NOT part of [`Channel`] — different
//! transports have fundamentally different connection parameters.
//! Concrete transports expose their own `connect` constructors; see
//! [`transports::memory`](crate::transports::memory) and
//! [`transports::websocket`](crate::transports::websocket).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, SessionError};

/// Bound on connection establishment when joining a session. A connect
/// attempt that has not produced an open channel by then is aborted and
/// surfaced as [`SessionError::Timeout`].
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A reliable, ordered, bidirectional text-message link between two
/// terminals.
///
/// Each `send` transmits one complete JSON message; each `recv` yields
/// one complete JSON message, in the order the peer sent them.
///
/// # Cancel Safety
///
/// [`recv`](Channel::recv) **MUST** be cancel-safe: it is polled inside
/// `tokio::select!` and a cancelled call must not lose a message.
/// Channel-based implementations (wrapping `mpsc::Receiver`) are
/// naturally cancel-safe.
#[async_trait]
pub trait Channel: Send + 'static {
    /// Send one JSON text message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportSend`] if the message could not
    /// be sent, or [`SessionError::ChannelClosed`] after `close`.
    async fn send(&mut self, message: String) -> Result<()>;

    /// Receive the next JSON text message from the peer.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message arrived
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the peer closed the channel cleanly
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the channel gracefully. Idempotent.
    async fn close(&mut self) -> Result<()>;

    /// Whether the channel is still believed open. Broadcasts skip
    /// closed channels silently; the next mutation resends anyway.
    fn is_open(&self) -> bool;
}

/// Host-side listening endpoint.
///
/// Owns the transport-assigned local address, which is used verbatim as
/// the human-shared session code.
#[async_trait]
pub trait Endpoint: Send + 'static {
    /// The channel type produced by [`accept`](Endpoint::accept).
    type Channel: Channel;

    /// The local address peers connect to: the session code.
    fn local_addr(&self) -> &str;

    /// Accept the next inbound channel. Returns `None` once the endpoint
    /// is closed and no further channels will arrive.
    ///
    /// # Cancel Safety
    ///
    /// Must be cancel-safe for the same reason as [`Channel::recv`].
    async fn accept(&mut self) -> Option<Self::Channel>;
}

/// Wrap a connect future with the standard join timeout.
///
/// # Errors
///
/// Returns [`SessionError::Timeout`] if the deadline elapses, otherwise
/// whatever the connect future returns.
pub async fn connect_bounded<C, F>(fut: F) -> Result<C>
where
    F: std::future::Future<Output = Result<C>>,
{
    tokio::time::timeout(CONNECT_TIMEOUT, fut)
        .await
        .map_err(|_| SessionError::Timeout)?
}
