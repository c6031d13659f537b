//! Host-side session loop: the single writer of the authoritative state.
//!
//! [`HostSession::start`] spawns a background loop that owns the
//! [`GameSession`] outright. Everything that can mutate it (inbound
//! peer commands, local host intents, the sabotage countdown, the
//! alert-clear delay) arrives through one `tokio::select!` and is
//! applied one command at a time, so there is never a concurrent writer
//! and never a stale closure reading yesterday's state.
//!
//! After every mutation the loop serializes the full session once and
//! pushes it to every open channel (closed ones are skipped silently;
//! the next mutation resends). A freshly accepted channel is sent the
//! current snapshot before anything else, so a late joiner is never
//! stuck without state.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::dispatch::{apply, Command};
use crate::error::{Result, SessionError};
use crate::event::SessionEvent;
use crate::protocol::{Envelope, GamePhase, GameSession, Message, Player, PlayerId, Role};
use crate::transport::{Channel, Endpoint};

/// Minimum number of non-host players required to start a game.
///
/// The observed logic wavered between 1 and 2 across iterations; 2 is
/// the smallest count for which the role pool guarantees both an
/// infiltrator and an intel officer, so 2 it is.
pub const MIN_NON_HOST_PLAYERS: usize = 2;

/// Default sabotage countdown.
pub const SABOTAGE_DURATION: Duration = Duration::from_secs(10 * 60);

/// Default delay before a transient alert banner is cleared.
pub const ALERT_CLEAR_DELAY: Duration = Duration::from_secs(4);

/// Banner raised when a scheduled chronogram instant is reached.
pub const ALERT_CHRONOGRAM: &str = "OPERATIONAL SYNCHRONISATION";

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`HostSession`].
///
/// All fields have defaults matching the reference game; tests shrink
/// the durations to keep wall-clock time out of assertions.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Non-host players required before `start_game` is accepted.
    pub min_players: usize,
    /// Pending-to-ready sabotage countdown.
    pub sabotage_duration: Duration,
    /// Delay before a scheduled alert clear fires.
    pub alert_clear_delay: Duration,
    /// Cadence of the timer tick driving the countdown and alert clears.
    pub tick_interval: Duration,
    /// Wall-clock instants (ms since the Unix epoch) at which the host
    /// raises the [`ALERT_CHRONOGRAM`] banner; each fires once and the
    /// banner clears after `alert_clear_delay`. Empty by default.
    pub chronogram_ms: Vec<u64>,
    /// Capacity of the bounded event channel. Values below 1 are
    /// clamped to 1. When the consumer lags, intermediate events are
    /// dropped; a later `SessionUpdated` always carries the full state.
    pub event_channel_capacity: usize,
    /// Grace period for [`HostSession::shutdown`] before the loop task
    /// is aborted.
    pub shutdown_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HostConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self {
            min_players: MIN_NON_HOST_PLAYERS,
            sabotage_duration: SABOTAGE_DURATION,
            alert_clear_delay: ALERT_CLEAR_DELAY,
            chronogram_ms: Vec::new(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the minimum non-host player count to start.
    #[must_use]
    pub fn with_min_players(mut self, min_players: usize) -> Self {
        self.min_players = min_players;
        self
    }

    /// Set the sabotage countdown duration.
    #[must_use]
    pub fn with_sabotage_duration(mut self, duration: Duration) -> Self {
        self.sabotage_duration = duration;
        self
    }

    /// Set the alert-clear delay.
    #[must_use]
    pub fn with_alert_clear_delay(mut self, delay: Duration) -> Self {
        self.alert_clear_delay = delay;
        self
    }

    /// Set the chronogram schedule (wall-clock ms since the Unix epoch).
    #[must_use]
    pub fn with_chronogram_ms(mut self, times: Vec<u64>) -> Self {
        self.chronogram_ms = times;
        self
    }

    /// Set the timer tick cadence.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
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

/// Handle to a running host loop.
///
/// Public methods queue a command to the loop and return once it is
/// queued (no round-trip await); the resulting state lands as a
/// [`SessionEvent::SessionUpdated`] and in [`HostSession::snapshot`].
pub struct HostSession {
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<GameSession>,
    running: Arc<AtomicBool>,
    host_id: PlayerId,
    code: String,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl HostSession {
    /// Create the session and start the host loop on `endpoint`.
    ///
    /// The endpoint's local address becomes the session code. Returns
    /// the handle plus the event receiver; the first event is
    /// [`SessionEvent::Connected`] followed by the initial snapshot.
    #[must_use = "the event receiver must be consumed to observe session updates"]
    pub fn start<E: Endpoint>(
        endpoint: E,
        host_name: impl Into<String>,
        config: HostConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let host = Player::new(host_name, Role::Host);
        let host_id = host.id;
        let code = endpoint.local_addr().to_string();
        let session = GameSession::new(code.clone(), host);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(session.clone());
        let running = Arc::new(AtomicBool::new(true));

        let shutdown_timeout = config.shutdown_timeout;
        let mut chronogram: Vec<u64> = config.chronogram_ms.clone();
        chronogram.sort_unstable();
        let state = HostLoop {
            endpoint,
            session,
            config,
            host_id,
            connections: HashMap::new(),
            next_conn_id: 0,
            accepting: true,
            alert_clear_at: None,
            chronogram: VecDeque::from(chronogram),
            conn_tx,
            event_tx,
            snapshot_tx,
            running: Arc::clone(&running),
            rng: StdRng::from_entropy(),
        };
        let task = tokio::spawn(state.run(cmd_rx, conn_rx, shutdown_rx));

        let handle = Self {
            cmd_tx,
            snapshot_rx,
            running,
            host_id,
            code,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };
        (handle, event_rx)
    }

    // ── Host intents ────────────────────────────────────────────────

    /// Assign roles and move the lobby to `Active`. Refused (as a
    /// silent no-op) below the configured minimum player count.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionClosed`] if the loop has exited.
    pub fn start_game(&self) -> Result<()> {
        self.send(Command::StartGame)
    }

    /// Sound the BIP alarm.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionClosed`] if the loop has exited.
    pub fn trigger_bip(&self) -> Result<()> {
        self.send(Command::BipTrigger)
    }

    /// Stand the alarm down and clear the banner (owner-restricted;
    /// this handle always acts as the host player).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionClosed`] if the loop has exited.
    pub fn release_bip(&self) -> Result<()> {
        self.send(Command::BipRelease)
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// The session code peers dial: the endpoint's local address.
    pub fn session_code(&self) -> &str {
        &self.code
    }

    /// The host player's identifier.
    pub fn host_id(&self) -> PlayerId {
        self.host_id
    }

    /// A clone of the current authoritative state.
    pub fn snapshot(&self) -> GameSession {
        self.snapshot_rx.borrow().clone()
    }

    /// Whether the host loop is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shut down the loop, closing every channel. The event receiver
    /// yields a final `Disconnected` and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("host session shutdown requested");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("host loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("host loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("host loop aborted: {join_err}");
                    }
                }
            }
        }
        self.running.store(false, Ordering::Release);
    }

    fn send(&self, command: Command) -> Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(SessionError::SessionClosed);
        }
        self.cmd_tx
            .send(command)
            .map_err(|_| SessionError::SessionClosed)
    }
}

impl std::fmt::Debug for HostSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSession")
            .field("code", &self.code)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        // Drop is synchronous; aborting is the only safe action here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Loop internals ──────────────────────────────────────────────────

/// Messages from per-connection reader tasks to the host loop.
enum ConnEvent {
    Inbound(u64, Envelope),
    Closed(u64),
}

/// Routing-table entry for one accepted channel.
struct Connection {
    out_tx: mpsc::UnboundedSender<String>,
    /// Learned from the peer's JOIN; used for lobby-phase removal.
    player_id: Option<PlayerId>,
}

struct HostLoop<E: Endpoint> {
    endpoint: E,
    session: GameSession,
    config: HostConfig,
    host_id: PlayerId,
    connections: HashMap<u64, Connection>,
    next_conn_id: u64,
    /// Cleared when the endpoint stops producing channels, so the
    /// select loop does not spin on a closed accept source.
    accepting: bool,
    /// Armed by a dispatch outcome; fires on a tick.
    alert_clear_at: Option<Instant>,
    /// Remaining chronogram instants, sorted ascending; each fires once.
    chronogram: VecDeque<u64>,
    conn_tx: mpsc::UnboundedSender<ConnEvent>,
    event_tx: mpsc::Sender<SessionEvent>,
    snapshot_tx: watch::Sender<GameSession>,
    running: Arc<AtomicBool>,
    rng: StdRng,
}

impl<E: Endpoint> HostLoop<E> {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut conn_rx: mpsc::UnboundedReceiver<ConnEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!(code = %self.session.code, "host loop started");
        emit_event(&self.event_tx, SessionEvent::Connected).await;
        emit_event(
            &self.event_tx,
            SessionEvent::SessionUpdated(Box::new(self.session.clone())),
        )
        .await;

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.tick().await; // first tick completes immediately

        let reason = loop {
            tokio::select! {
                // Branch 1: inbound channel from a joining peer
                maybe = self.endpoint.accept(), if self.accepting => {
                    match maybe {
                        Some(channel) => self.admit(channel),
                        None => {
                            debug!("endpoint closed; no further joins accepted");
                            self.accepting = false;
                        }
                    }
                }

                // Branch 2: message or close from an admitted peer
                Some(conn_event) = conn_rx.recv() => {
                    match conn_event {
                        ConnEvent::Inbound(conn_id, envelope) => {
                            self.handle_inbound(conn_id, envelope).await;
                        }
                        ConnEvent::Closed(conn_id) => {
                            self.handle_closed(conn_id).await;
                        }
                    }
                }

                // Branch 3: local intent from the handle
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(command) => {
                            self.dispatch(command, Some(self.host_id)).await;
                        }
                        None => {
                            debug!("handle dropped, shutting down host loop");
                            break Some("host shut down".to_string());
                        }
                    }
                }

                // Branch 4: timer tick
                _ = ticker.tick() => self.tick().await,

                // Branch 5: shutdown signal
                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    break Some("host shut down".to_string());
                }
            }
        };

        // Dropping the routing table lets every connection task observe
        // a closed outbound queue, close its channel, and exit.
        self.connections.clear();
        self.running.store(false, Ordering::Release);
        let event = SessionEvent::Disconnected { reason };
        // Blocking send: Disconnected is the final event and must not be
        // dropped by a full channel.
        if self.event_tx.send(event).await.is_err() {
            debug!("event channel closed, receiver dropped");
        }
        debug!("host loop exited");
    }

    /// Admit a freshly accepted channel: queue the current snapshot
    /// first (a late joiner never waits for the next mutation), then
    /// hand the channel to its own reader task.
    fn admit(&mut self, channel: E::Channel) {
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;

        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        match serde_json::to_string(&Envelope::sync(&self.session)) {
            Ok(json) => {
                let _ = out_tx.send(json);
            }
            Err(e) => error!("failed to serialize welcome snapshot: {e}"),
        }

        tokio::spawn(connection_loop(
            conn_id,
            channel,
            out_rx,
            self.conn_tx.clone(),
        ));
        self.connections.insert(
            conn_id,
            Connection {
                out_tx,
                player_id: None,
            },
        );
        debug!(conn_id, "peer channel admitted");
    }

    async fn handle_inbound(&mut self, conn_id: u64, envelope: Envelope) {
        // A JOIN identifies the peer behind this channel; remember it so
        // a lobby-phase close can remove the right player.
        let join_info = match &envelope.message {
            Message::Join(player) => {
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    conn.player_id = Some(player.id);
                }
                Some((player.id, player.name.clone()))
            }
            _ => None,
        };

        let sender = envelope
            .sender_id
            .or_else(|| join_info.as_ref().map(|(id, _)| *id));
        let Some(command) = Command::from_wire(envelope.message) else {
            warn!(conn_id, "peer sent SYNC_SESSION; ignoring");
            return;
        };

        let changed = self.dispatch(command, sender).await;
        if changed {
            if let Some((player_id, name)) = join_info {
                emit_event(&self.event_tx, SessionEvent::PeerJoined { player_id, name }).await;
            }
        }
    }

    /// Apply one command through the dispatcher; broadcast on change.
    /// Returns whether the session changed.
    async fn dispatch(&mut self, command: Command, sender: Option<PlayerId>) -> bool {
        let banner_before = self.session.alert_msg.clone();
        let outcome = apply(
            &mut self.session,
            command,
            sender,
            now_ms(),
            self.config.min_players,
            &mut self.rng,
        );
        if outcome.schedule_alert_clear {
            self.alert_clear_at = Some(Instant::now() + self.config.alert_clear_delay);
        } else if outcome.changed && self.session.alert_msg != banner_before {
            // The banner belongs to this command now; a deadline armed
            // for an earlier banner must not wipe it.
            self.alert_clear_at = None;
        }
        if outcome.changed {
            self.broadcast().await;
        }
        outcome.changed
    }

    async fn handle_closed(&mut self, conn_id: u64) {
        let Some(conn) = self.connections.remove(&conn_id) else {
            return;
        };
        debug!(conn_id, "peer channel closed");
        let Some(player_id) = conn.player_id else {
            return;
        };
        emit_event(&self.event_tx, SessionEvent::PeerLeft { player_id }).await;

        // Only a lobby disconnect removes the player from game state;
        // mid-game the entry stays so the session can continue (and the
        // peer can be reseated by a future reconnect JOIN).
        if self.session.phase == GamePhase::Lobby && self.session.remove_player(player_id) {
            self.broadcast().await;
        }
    }

    async fn tick(&mut self) {
        let now = now_ms();
        let duration_ms = self.config.sabotage_duration.as_millis() as u64;
        if self.session.sabotage.tick(now, duration_ms) {
            debug!("sabotage countdown elapsed, ready for upload");
            self.broadcast().await;
        }

        // Due chronogram instants collapse into one banner per tick.
        let mut chronogram_due = false;
        while self.chronogram.front().is_some_and(|&t| t <= now) {
            self.chronogram.pop_front();
            chronogram_due = true;
        }
        if chronogram_due {
            debug!("chronogram instant reached");
            self.session.alert_msg = Some(ALERT_CHRONOGRAM.to_string());
            self.alert_clear_at = Some(Instant::now() + self.config.alert_clear_delay);
            self.broadcast().await;
        }

        if let Some(deadline) = self.alert_clear_at {
            if Instant::now() >= deadline {
                self.alert_clear_at = None;
                if self.session.alert_msg.take().is_some() {
                    self.broadcast().await;
                }
            }
        }
    }

    /// Serialize the session once and push it to every open channel;
    /// also publish to the local watch and the event stream.
    async fn broadcast(&mut self) {
        match serde_json::to_string(&Envelope::sync(&self.session)) {
            Ok(json) => {
                for conn in self.connections.values() {
                    // A closed peer's queue drops the message; its Closed
                    // event is already in flight and the entry goes away.
                    let _ = conn.out_tx.send(json.clone());
                }
            }
            Err(e) => error!("failed to serialize session snapshot: {e}"),
        }

        let _ = self.snapshot_tx.send(self.session.clone());
        emit_event(
            &self.event_tx,
            SessionEvent::SessionUpdated(Box::new(self.session.clone())),
        )
        .await;
    }
}

/// Per-connection reader/writer task. Exits when the peer closes, a
/// transport error occurs, or the host loop drops the outbound queue.
async fn connection_loop<C: Channel>(
    conn_id: u64,
    mut channel: C,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    conn_tx: mpsc::UnboundedSender<ConnEvent>,
) {
    loop {
        tokio::select! {
            outbound = out_rx.recv() => {
                match outbound {
                    Some(json) => {
                        if let Err(e) = channel.send(json).await {
                            warn!(conn_id, "send to peer failed: {e}");
                            break;
                        }
                    }
                    // Host loop dropped this connection.
                    None => {
                        let _ = channel.close().await;
                        break;
                    }
                }
            }
            inbound = channel.recv() => {
                match inbound {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                if conn_tx.send(ConnEvent::Inbound(conn_id, envelope)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(conn_id, "ignoring malformed message: {e}"),
                        }
                    }
                    Some(Err(e)) => {
                        warn!(conn_id, "receive from peer failed: {e}");
                        break;
                    }
                    None => {
                        debug!(conn_id, "peer closed channel");
                        break;
                    }
                }
            }
        }
    }
    let _ = conn_tx.send(ConnEvent::Closed(conn_id));
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

/// Wall-clock milliseconds since the Unix epoch. This is the timestamp
/// written into the synchronized snapshot, so every terminal derives
/// the same sabotage deadline.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
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
    use crate::transports::MemoryNetwork;

    #[test]
    fn config_builders_clamp_and_set() {
        let config = HostConfig::new()
            .with_min_players(3)
            .with_sabotage_duration(Duration::from_secs(5))
            .with_alert_clear_delay(Duration::from_millis(100))
            .with_tick_interval(Duration::from_millis(20))
            .with_event_channel_capacity(0)
            .with_shutdown_timeout(Duration::from_secs(2))
            .with_chronogram_ms(vec![2_000, 1_000]);

        assert_eq!(config.min_players, 3);
        assert_eq!(config.sabotage_duration, Duration::from_secs(5));
        assert_eq!(config.alert_clear_delay, Duration::from_millis(100));
        assert_eq!(config.tick_interval, Duration::from_millis(20));
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.chronogram_ms, vec![2_000, 1_000]);
    }

    #[tokio::test]
    async fn start_seats_the_host_and_uses_the_endpoint_addr_as_code() {
        let network = MemoryNetwork::new();
        let endpoint = network.open();
        let addr = endpoint.local_addr().to_string();

        let (mut host, mut events) =
            HostSession::start(endpoint, "Capitaine", HostConfig::new());
        assert_eq!(host.session_code(), addr);

        let ev = events.recv().await.unwrap();
        assert!(matches!(ev, SessionEvent::Connected));
        let ev = events.recv().await.unwrap();
        match ev {
            SessionEvent::SessionUpdated(session) => {
                assert_eq!(session.code, addr);
                assert_eq!(session.players.len(), 1);
                assert_eq!(session.role_of(host.host_id()), Some(Role::Host));
                assert_eq!(session.phase, GamePhase::Lobby);
            }
            other => panic!("expected the initial snapshot, got {other:?}"),
        }

        host.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop_and_rejects_intents() {
        let network = MemoryNetwork::new();
        let (mut host, mut events) =
            HostSession::start(network.open(), "Capitaine", HostConfig::new());

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // initial snapshot
        host.shutdown().await;

        assert!(!host.is_running());
        assert!(matches!(
            host.start_game(),
            Err(SessionError::SessionClosed)
        ));

        let ev = events.recv().await.unwrap();
        assert!(matches!(ev, SessionEvent::Disconnected { .. }));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let network = MemoryNetwork::new();
        let (mut host, mut events) =
            HostSession::start(network.open(), "Capitaine", HostConfig::new());
        let _ = events.recv().await; // Connected
        host.shutdown().await;
        host.shutdown().await;
    }
}
