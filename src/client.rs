//! Client-side session mirror.
//!
//! A client terminal never mutates game state directly: it forwards
//! user intents to the host as commands and replaces its local view
//! wholesale whenever a `SYNC_SESSION` snapshot arrives. A terminal
//! that falls out of sync self-heals on the next snapshot, because
//! snapshots are never partial.
//!
//! [`ClientSession::join`] is a thin handle over a background loop:
//! unbounded command queue in, bounded event channel out,
//! `tokio::select!` in the middle. The first outgoing message is always
//! the `JOIN` carrying the freshly minted local player.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, warn};

use crate::error::{Result, SessionError};
use crate::event::SessionEvent;
use crate::protocol::{Envelope, GameSession, Message, Player, PlayerId, Role};
use crate::transport::Channel;

const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`ClientSession`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Capacity of the bounded event channel (clamped to at least 1).
    pub event_channel_capacity: usize,
    /// Grace period for [`ClientSession::shutdown`] before the loop
    /// task is aborted.
    pub shutdown_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the event channel capacity (clamped to at least 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Handle ──────────────────────────────────────────────────────────

/// Handle to a running client loop.
///
/// Intent methods queue a command to the host and return once queued;
/// the effect (if any) arrives later as a [`SessionEvent::SessionUpdated`].
pub struct ClientSession {
    cmd_tx: mpsc::UnboundedSender<Envelope>,
    mirror_rx: watch::Receiver<Option<GameSession>>,
    connected: Arc<AtomicBool>,
    player_id: PlayerId,
    player_name: String,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ClientSession {
    /// Join the session reachable over `channel` as `player_name`.
    ///
    /// Mints a local [`Player`] (lobby role: guard) and sends its `JOIN`
    /// as the very first outgoing message. Returns the handle plus the
    /// event receiver; the first events are [`SessionEvent::Connected`]
    /// and then the host's welcome snapshot.
    #[must_use = "the event receiver must be consumed to observe session updates"]
    pub fn join<C: Channel>(
        channel: C,
        player_name: impl Into<String>,
        config: ClientConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        Self::spawn(channel, Player::new(player_name, Role::Guard), config)
    }

    /// Rejoin over a fresh channel as an already-seated `player`, e.g.
    /// after the previous connection dropped mid-game.
    ///
    /// The `JOIN` carries the existing player verbatim, so the host
    /// (which keeps mid-game seats across disconnects and treats joins
    /// as idempotent per id) reseats the same player instead of adding
    /// a new one. The caller supplies the player as last seen in a
    /// snapshot; a made-up id simply joins as a new player.
    #[must_use = "the event receiver must be consumed to observe session updates"]
    pub fn resume<C: Channel>(
        channel: C,
        player: Player,
        config: ClientConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        Self::spawn(channel, player, config)
    }

    fn spawn<C: Channel>(
        channel: C,
        player: Player,
        config: ClientConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let player_id = player.id;
        let player_name = player.name.clone();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Envelope>();
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (mirror_tx, mirror_rx) = watch::channel(None);
        let connected = Arc::new(AtomicBool::new(true));

        // Queue JOIN before the loop starts so it is the first message
        // on the wire.
        let join = Envelope::command(Message::Join(player), player_id);
        let _ = cmd_tx.send(join);

        let task = tokio::spawn(client_loop(
            channel,
            cmd_rx,
            event_tx,
            mirror_tx,
            Arc::clone(&connected),
            shutdown_rx,
        ));

        let handle = Self {
            cmd_tx,
            mirror_rx,
            connected,
            player_id,
            player_name,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (handle, event_rx)
    }

    // ── Intents ─────────────────────────────────────────────────────

    /// Start the timed sabotage (infiltrator intent).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the loop has exited.
    pub fn sabotage_start(&self) -> Result<()> {
        self.send(Message::SabotageStart)
    }

    /// Report the sabotage (crew intent); the host only honors it from
    /// a non-host, non-infiltrated sender.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the loop has exited.
    pub fn report_sabotage(&self) -> Result<()> {
        self.send(Message::SabotageReport)
    }

    /// Complete the sabotage, attaching the proof-image reference.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the loop has exited.
    pub fn complete_sabotage(&self, proof_ref: impl Into<String>) -> Result<()> {
        self.send(Message::SabotageComplete(proof_ref.into()))
    }

    /// Sound the BIP alarm (any player may).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the loop has exited.
    pub fn trigger_bip(&self) -> Result<()> {
        self.send(Message::BipTrigger)
    }

    /// Ask to stand the alarm down. The host dispatcher rejects this
    /// from anyone but the host player; it exists here because the wire
    /// allows it, not because it will be honored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the loop has exited.
    pub fn release_bip(&self) -> Result<()> {
        self.send(Message::BipRelease)
    }

    /// Consume the one-shot intel check. The generated report itself is
    /// displayed locally (see [`narrator`](crate::narrator)); only the
    /// consumption is session state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the loop has exited.
    pub fn use_intel(&self) -> Result<()> {
        self.send(Message::CodisUse)
    }

    /// Re-send the `JOIN` for this terminal's player, e.g. after a
    /// transient drop on a transport that reconnects in place. Safe to
    /// repeat: the host treats duplicate joins as a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] if the loop has exited.
    pub fn rejoin(&self) -> Result<()> {
        let player = self
            .my_player()
            .unwrap_or_else(|| Player {
                id: self.player_id,
                name: self.player_name.clone(),
                role: Role::Guard,
                neutralised: false,
            });
        self.send(Message::Join(player))
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// This terminal's player identifier.
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// The mirrored session, if at least one snapshot has arrived.
    pub fn snapshot(&self) -> Option<GameSession> {
        self.mirror_rx.borrow().clone()
    }

    /// This terminal's player as the host currently sees it.
    pub fn my_player(&self) -> Option<Player> {
        self.mirror_rx
            .borrow()
            .as_ref()
            .and_then(|s| s.player(self.player_id).cloned())
    }

    /// Whether the channel to the host is believed live.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Shut down the loop, closing the channel to the host. The event
    /// receiver yields a final `Disconnected` and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("client session shutdown requested");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("client loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("client loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("client loop aborted: {join_err}");
                    }
                }
            }
        }
        self.connected.store(false, Ordering::Release);
    }

    fn send(&self, message: Message) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(SessionError::NotConnected);
        }
        self.cmd_tx
            .send(Envelope::command(message, self.player_id))
            .map_err(|_| SessionError::NotConnected)
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("player", &self.player_name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Client loop ─────────────────────────────────────────────────────

async fn client_loop<C: Channel>(
    mut channel: C,
    mut cmd_rx: mpsc::UnboundedReceiver<Envelope>,
    event_tx: mpsc::Sender<SessionEvent>,
    mirror_tx: watch::Sender<Option<GameSession>>,
    connected: Arc<AtomicBool>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("client loop started");
    emit_event(&event_tx, SessionEvent::Connected).await;

    let reason = loop {
        tokio::select! {
            // Branch 1: outgoing intent from the handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(envelope) => {
                        match serde_json::to_string(&envelope) {
                            Ok(json) => {
                                if let Err(e) = channel.send(json).await {
                                    error!("send to host failed: {e}");
                                    break Some(format!("transport send error: {e}"));
                                }
                            }
                            // A serialization failure is a programming
                            // bug; don't kill the loop over it.
                            Err(e) => error!("failed to serialize command: {e}"),
                        }
                    }
                    None => {
                        debug!("handle dropped, shutting down client loop");
                        let _ = channel.close().await;
                        break Some("client shut down".to_string());
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = channel.close().await;
                break Some("client shut down".to_string());
            }

            // Branch 3: snapshot (or stray message) from the host
            incoming = channel.recv() => {
                match incoming {
                    Some(Ok(text)) => handle_incoming(&text, &event_tx, &mirror_tx).await,
                    Some(Err(e)) => {
                        error!("receive from host failed: {e}");
                        break Some(format!("transport receive error: {e}"));
                    }
                    None => {
                        debug!("host closed the channel");
                        break None;
                    }
                }
            }
        }
    };

    connected.store(false, Ordering::Release);
    let event = SessionEvent::Disconnected { reason };
    // Blocking send: Disconnected is the final event and must not be
    // dropped by a full channel.
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
    debug!("client loop exited");
}

async fn handle_incoming(
    text: &str,
    event_tx: &mpsc::Sender<SessionEvent>,
    mirror_tx: &watch::Sender<Option<GameSession>>,
) {
    match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => match envelope.message {
            Message::SyncSession(session) => {
                // Wholesale replacement; no merge semantics exist.
                let _ = mirror_tx.send(Some((*session).clone()));
                emit_event(event_tx, SessionEvent::SessionUpdated(session)).await;
            }
            other => {
                warn!(
                    "unexpected message from host: {:?}",
                    std::mem::discriminant(&other)
                );
            }
        },
        Err(e) => {
            warn!("failed to deserialize host message: {e}, raw: {text}");
        }
    }
}

/// Emit an event, dropping it (with a warning) if the consumer lags.
async fn emit_event(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
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
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Poll until `sent` holds at least `n` messages (sends race the
    /// event stream; they live on different select branches).
    async fn wait_sent(sent: &Arc<StdMutex<Vec<String>>>, n: usize) {
        for _ in 0..100 {
            if sent.lock().unwrap().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} sent messages, got {:?}", sent.lock().unwrap());
    }

    /// Scripted channel: replays `incoming` in order, records sends.
    struct MockChannel {
        incoming: VecDeque<Option<crate::error::Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockChannel {
        fn new(
            incoming: Vec<Option<crate::error::Result<String>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let channel = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (channel, sent, closed)
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        async fn send(&mut self, message: String) -> crate::error::Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<crate::error::Result<String>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // Scripted input exhausted; stay alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> crate::error::Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::Relaxed)
        }
    }

    fn sync_json(code: &str) -> String {
        let host = Player::new("Capitaine", Role::Host);
        let session = GameSession::new(code, host);
        serde_json::to_string(&Envelope::sync(&session)).unwrap()
    }

    #[tokio::test]
    async fn join_is_first_message_on_the_wire() {
        let (channel, sent, _closed) = MockChannel::new(vec![Some(Ok(sync_json("SCL-1")))]);
        let (mut client, mut events) = ClientSession::join(channel, "Rossi", ClientConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionUpdated
        wait_sent(&sent, 1).await;

        {
            let messages = sent.lock().unwrap();
            let first: Envelope = serde_json::from_str(&messages[0]).unwrap();
            match first.message {
                Message::Join(player) => {
                    assert_eq!(player.name, "Rossi");
                    assert_eq!(player.id, client.player_id());
                }
                other => panic!("expected JOIN first, got {other:?}"),
            }
            assert_eq!(first.sender_id, Some(client.player_id()));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn resume_joins_with_the_existing_player_verbatim() {
        let seat = Player {
            id: uuid::Uuid::from_u128(42),
            name: "Rossi".into(),
            role: Role::Infiltrated,
            neutralised: false,
        };
        let (channel, sent, _closed) = MockChannel::new(vec![Some(Ok(sync_json("SCL-1")))]);
        let (mut client, mut events) =
            ClientSession::resume(channel, seat.clone(), ClientConfig::new());

        assert_eq!(client.player_id(), seat.id);
        let _ = events.recv().await; // Connected
        wait_sent(&sent, 1).await;

        {
            let messages = sent.lock().unwrap();
            let first: Envelope = serde_json::from_str(&messages[0]).unwrap();
            match first.message {
                Message::Join(player) => {
                    assert_eq!(player.id, seat.id);
                    assert_eq!(player.name, "Rossi");
                    assert_eq!(player.role, Role::Infiltrated);
                }
                other => panic!("expected JOIN first, got {other:?}"),
            }
            assert_eq!(first.sender_id, Some(seat.id));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn sync_replaces_mirror_wholesale() {
        let (channel, _sent, _closed) = MockChannel::new(vec![
            Some(Ok(sync_json("SCL-FIRST"))),
            Some(Ok(sync_json("SCL-SECOND"))),
        ]);
        let (mut client, mut events) = ClientSession::join(channel, "Rossi", ClientConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // first snapshot
        let ev = events.recv().await.unwrap(); // second snapshot

        match ev {
            SessionEvent::SessionUpdated(session) => assert_eq!(session.code, "SCL-SECOND"),
            other => panic!("expected SessionUpdated, got {other:?}"),
        }
        assert_eq!(client.snapshot().map(|s| s.code).as_deref(), Some("SCL-SECOND"));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_host_message_is_ignored() {
        let (channel, _sent, _closed) = MockChannel::new(vec![
            Some(Ok("{not json".to_string())),
            Some(Ok(sync_json("SCL-OK"))),
        ]);
        let (mut client, mut events) = ClientSession::join(channel, "Rossi", ClientConfig::new());

        let _ = events.recv().await; // Connected
        let ev = events.recv().await.unwrap(); // snapshot after the garbage
        assert!(matches!(ev, SessionEvent::SessionUpdated(_)));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn host_close_emits_disconnected() {
        let (channel, _sent, _closed) =
            MockChannel::new(vec![Some(Ok(sync_json("SCL-1"))), None]);
        let (mut client, mut events) = ClientSession::join(channel, "Rossi", ClientConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionUpdated
        let ev = events.recv().await.unwrap();
        assert!(matches!(ev, SessionEvent::Disconnected { reason: None }));
        assert!(!client.is_connected());

        let err = client.trigger_bip().unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_error_reason_is_propagated() {
        let (channel, _sent, _closed) = MockChannel::new(vec![Some(Err(
            SessionError::TransportReceive("wire cut".into()),
        ))]);
        let (mut client, mut events) = ClientSession::join(channel, "Rossi", ClientConfig::new());

        let _ = events.recv().await; // Connected
        let ev = events.recv().await.unwrap();
        match ev {
            SessionEvent::Disconnected { reason } => {
                assert!(reason.unwrap().contains("wire cut"));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_channel_and_emits_disconnected() {
        let (channel, _sent, closed) = MockChannel::new(vec![Some(Ok(sync_json("SCL-1")))]);
        let (mut client, mut events) = ClientSession::join(channel, "Rossi", ClientConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionUpdated
        client.shutdown().await;

        let ev = events.recv().await.unwrap();
        match ev {
            SessionEvent::Disconnected { reason } => {
                assert_eq!(reason.as_deref(), Some("client shut down"));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(closed.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn intents_carry_the_sender_id() {
        let (channel, sent, _closed) = MockChannel::new(vec![Some(Ok(sync_json("SCL-1")))]);
        let (mut client, mut events) = ClientSession::join(channel, "Rossi", ClientConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // SessionUpdated

        client.complete_sabotage("img://proof").unwrap();
        wait_sent(&sent, 2).await; // JOIN, then the intent

        {
            let messages = sent.lock().unwrap();
            let last: Envelope = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert_eq!(last.sender_id, Some(client.player_id()));
            match last.message {
                Message::SabotageComplete(proof) => assert_eq!(proof, "img://proof"),
                other => panic!("expected SABOTAGE_COMPLETE, got {other:?}"),
            }
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (channel, _sent, _closed) = MockChannel::new(vec![]);
        let (mut client, mut events) = ClientSession::join(channel, "Rossi", ClientConfig::new());
        let _ = events.recv().await; // Connected
        client.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn config_builder_methods() {
        let config = ClientConfig::new()
            .with_event_channel_capacity(0)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }
}
