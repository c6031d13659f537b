//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The host binds a [`WsEndpoint`] on a TCP socket; the bound address is
//! the session code peers dial. Clients open a [`WsChannel`] with
//! [`WsChannel::connect`], which accepts the bare `host:port` code and
//! prefixes the `ws://` scheme itself.
//!
//! # Feature gate
//!
//! Only available with the `transport-websocket` feature (enabled by
//! default).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::{Result, SessionError};
use crate::transport::{Channel, Endpoint};

/// Underlying socket type for an outbound (client) connection.
pub type WsClientTransport = tokio_tungstenite::MaybeTlsStream<TcpStream>;

/// A [`Channel`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Channel::recv) is cancel-safe: dropping the returned future
/// before completion does not lose messages, making it safe inside
/// `tokio::select!`.
#[derive(Debug)]
pub struct WsChannel<S> {
    stream: tokio_tungstenite::WebSocketStream<S>,
    closed: bool,
}

impl WsChannel<WsClientTransport> {
    /// Dial the peer listening at `addr` (a bare `host:port` session code).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the connection cannot be
    /// established; the underlying [`ErrorKind`](std::io::ErrorKind) is
    /// preserved where available.
    pub async fn connect(addr: &str) -> Result<Self> {
        let url = format!("ws://{addr}");
        tracing::debug!(url = %url, "connecting to session host");

        let (stream, _response) = tokio_tungstenite::connect_async(&url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            SessionError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "connected to session host");
        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Dial with the standard join timeout
    /// ([`CONNECT_TIMEOUT`](crate::transport::CONNECT_TIMEOUT)).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Timeout`] if the deadline elapses, or any
    /// error [`connect`](Self::connect) may return.
    pub async fn connect_bounded(addr: &str) -> Result<Self> {
        crate::transport::connect_bounded(Self::connect(addr)).await
    }
}

#[async_trait]
impl<S> Channel for WsChannel<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: String) -> Result<()> {
        if self.closed {
            return Err(SessionError::ChannelClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(SessionError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite auto-queues the Pong reply.
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    // Never produced by the read half; kept for exhaustiveness.
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

/// Host-side listener. The bound socket address is the session code.
#[derive(Debug)]
pub struct WsEndpoint {
    listener: TcpListener,
    local_addr: String,
}

impl WsEndpoint {
    /// Bind a listener on `bind_addr` (e.g. `"0.0.0.0:7540"` or
    /// `"127.0.0.1:0"` for an ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the socket cannot be bound.
    pub async fn bind(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?.to_string();
        tracing::info!(addr = %local_addr, "session endpoint listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }
}

#[async_trait]
impl Endpoint for WsEndpoint {
    type Channel = WsChannel<TcpStream>;

    fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// Accept the next inbound connection and run the WebSocket
    /// handshake inline. A cancelled or failed handshake drops that
    /// attempt only; the peer sees a connection error and retries.
    async fn accept(&mut self) -> Option<Self::Channel> {
        loop {
            let (tcp, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!("TCP accept failed: {e}");
                    return None;
                }
            };
            match tokio_tungstenite::accept_async(tcp).await {
                Ok(stream) => {
                    tracing::debug!(%peer, "inbound channel established");
                    return Some(WsChannel {
                        stream,
                        closed: false,
                    });
                }
                Err(e) => {
                    tracing::warn!(%peer, "WebSocket handshake failed: {e}");
                    // Keep listening.
                }
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::transport::CONNECT_TIMEOUT;

    #[test]
    fn ws_channel_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WsChannel<TcpStream>>();
        assert_send::<WsEndpoint>();
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let result = WsChannel::connect("127.0.0.1:1").await;
        assert!(matches!(result.unwrap_err(), SessionError::Io(_)));
    }

    #[tokio::test]
    async fn connect_bounded_times_out_on_blackhole() {
        // Non-routable TEST-NET-1 address guarantees no response.
        tokio::time::pause();
        let handle = tokio::spawn(WsChannel::connect_bounded("192.0.2.1:1"));
        tokio::time::advance(CONNECT_TIMEOUT + std::time::Duration::from_secs(1)).await;
        let result = handle.await.unwrap();
        assert!(matches!(
            result.unwrap_err(),
            SessionError::Timeout | SessionError::Io(_)
        ));
    }

    #[tokio::test]
    async fn accepted_channel_round_trips_text() {
        let mut endpoint = WsEndpoint::bind("127.0.0.1:0").await.unwrap();
        let addr = endpoint.local_addr().to_string();

        let client_task = tokio::spawn(async move {
            let mut client = WsChannel::connect(&addr).await.unwrap();
            client.send("hello host".into()).await.unwrap();
            let reply = client.recv().await.unwrap().unwrap();
            assert_eq!(reply, "hello client");
            client.close().await.unwrap();
        });

        let mut server = endpoint.accept().await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), "hello host");
        server.send("hello client".into()).await.unwrap();

        // Peer close surfaces as a clean end of stream.
        assert!(server.recv().await.is_none());
        client_task.await.unwrap();
    }

    #[tokio::test]
    async fn send_after_close_returns_channel_closed() {
        let mut endpoint = WsEndpoint::bind("127.0.0.1:0").await.unwrap();
        let addr = endpoint.local_addr().to_string();

        let accept_task = tokio::spawn(async move { endpoint.accept().await });
        let mut client = WsChannel::connect(&addr).await.unwrap();
        let _server = accept_task.await.unwrap();

        client.close().await.unwrap();
        assert!(!client.is_open());
        // Double close is idempotent.
        client.close().await.unwrap();

        let err = client.send("oops".into()).await.unwrap_err();
        assert!(matches!(err, SessionError::ChannelClosed));
    }
}
