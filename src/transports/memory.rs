//! In-process transport backed by paired mpsc queues.
//!
//! A [`MemoryNetwork`] is a registry of listening endpoints keyed by
//! generated address codes. Connecting to a registered code pairs two
//! [`MemoryChannel`] halves and hands one to the endpoint's accept
//! queue. Delivery is reliable and ordered per channel, which is exactly
//! the contract the session core assumes from the real peer transport.
//!
//! Used by the integration tests and the `local_session` demo; it also
//! makes a full host + clients setup runnable in a single process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;

use crate::error::{Result, SessionError};
use crate::transport::{Channel, Endpoint};

/// Length of the random part of a generated address code.
const ADDR_SUFFIX_LEN: usize = 6;

type Registry = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<MemoryChannel>>>>;

/// In-process address registry.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    registry: Registry,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a listening endpoint with a freshly generated address code.
    pub fn open(&self) -> MemoryEndpoint {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let mut registry = lock_registry(&self.registry);
        let addr = loop {
            let candidate = generate_addr(&mut rand::thread_rng());
            if !registry.contains_key(&candidate) {
                break candidate;
            }
        };
        registry.insert(addr.clone(), accept_tx);
        drop(registry);

        MemoryEndpoint {
            addr,
            incoming: accept_rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Connect to the endpoint listening at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::PeerUnreachable`] if no endpoint is
    /// registered under that code or the endpoint has been dropped.
    pub fn connect(&self, addr: &str) -> Result<MemoryChannel> {
        let registry = lock_registry(&self.registry);
        let accept_tx = registry
            .get(addr)
            .ok_or_else(|| SessionError::PeerUnreachable(addr.to_string()))?;

        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let local = MemoryChannel {
            tx: Some(a_tx),
            rx: a_rx,
        };
        let remote = MemoryChannel {
            tx: Some(b_tx),
            rx: b_rx,
        };

        accept_tx
            .send(remote)
            .map_err(|_| SessionError::PeerUnreachable(addr.to_string()))?;
        Ok(local)
    }
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = lock_registry(&self.registry).len();
        f.debug_struct("MemoryNetwork")
            .field("endpoints", &count)
            .finish()
    }
}

/// One half of a paired in-process channel.
#[derive(Debug)]
pub struct MemoryChannel {
    /// `None` after a local close; dropping the sender lets the peer's
    /// `recv` drain and then return `None`.
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, message: String) -> Result<()> {
        let Some(tx) = &self.tx else {
            return Err(SessionError::ChannelClosed);
        };
        tx.send(message)
            .map_err(|_| SessionError::TransportSend("peer hung up".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Listening endpoint registered in a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryEndpoint {
    addr: String,
    incoming: mpsc::UnboundedReceiver<MemoryChannel>,
    registry: Registry,
}

#[async_trait]
impl Endpoint for MemoryEndpoint {
    type Channel = MemoryChannel;

    fn local_addr(&self) -> &str {
        &self.addr
    }

    async fn accept(&mut self) -> Option<MemoryChannel> {
        self.incoming.recv().await
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        lock_registry(&self.registry).remove(&self.addr);
    }
}

/// Generated codes look like `SCL-7K2F9Q`: short enough to read out
/// loud, long enough to avoid collisions at this scale.
fn generate_addr<R: Rng>(rng: &mut R) -> String {
    let suffix: String = (0..ADDR_SUFFIX_LEN)
        .map(|_| {
            let c = rng.sample(rand::distributions::Alphanumeric) as char;
            c.to_ascii_uppercase()
        })
        .collect();
    format!("SCL-{suffix}")
}

fn lock_registry(
    registry: &Registry,
) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<MemoryChannel>>> {
    // The registry is only held for map inserts/lookups; a poisoned lock
    // means a panic mid-insert, where continuing with the map as-is is
    // still sound.
    match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
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

    #[tokio::test]
    async fn connect_unknown_addr_fails() {
        let network = MemoryNetwork::new();
        let err = network.connect("SCL-NOBODY").unwrap_err();
        assert!(matches!(err, SessionError::PeerUnreachable(_)));
    }

    #[tokio::test]
    async fn messages_flow_both_ways_in_order() {
        let network = MemoryNetwork::new();
        let mut endpoint = network.open();

        let mut client = network.connect(endpoint.local_addr()).unwrap();
        let mut server = endpoint.accept().await.unwrap();

        client.send("one".into()).await.unwrap();
        client.send("two".into()).await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), "one");
        assert_eq!(server.recv().await.unwrap().unwrap(), "two");

        server.send("ack".into()).await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), "ack");
    }

    #[tokio::test]
    async fn close_drains_then_ends_peer_recv() {
        let network = MemoryNetwork::new();
        let mut endpoint = network.open();

        let mut client = network.connect(endpoint.local_addr()).unwrap();
        let mut server = endpoint.accept().await.unwrap();

        client.send("last words".into()).await.unwrap();
        client.close().await.unwrap();
        assert!(!client.is_open());

        // In-flight message still delivered, then a clean end.
        assert_eq!(server.recv().await.unwrap().unwrap(), "last words");
        assert!(server.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_errors() {
        let network = MemoryNetwork::new();
        let mut endpoint = network.open();
        let mut client = network.connect(endpoint.local_addr()).unwrap();
        let _server = endpoint.accept().await.unwrap();

        client.close().await.unwrap();
        let err = client.send("oops".into()).await.unwrap_err();
        assert!(matches!(err, SessionError::ChannelClosed));
    }

    #[tokio::test]
    async fn dropping_endpoint_deregisters_addr() {
        let network = MemoryNetwork::new();
        let endpoint = network.open();
        let addr = endpoint.local_addr().to_string();

        drop(endpoint);
        let err = network.connect(&addr).unwrap_err();
        assert!(matches!(err, SessionError::PeerUnreachable(_)));
    }

    #[test]
    fn generated_addrs_have_expected_shape() {
        let addr = generate_addr(&mut rand::thread_rng());
        assert!(addr.starts_with("SCL-"));
        assert_eq!(addr.len(), 4 + ADDR_SUFFIX_LEN);
        assert!(addr.chars().all(|c| !c.is_ascii_lowercase()));
    }
}
