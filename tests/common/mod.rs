#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for the session integration tests.
//!
//! Wires real host and client loops together over a [`MemoryNetwork`]
//! and provides polling helpers over their snapshots, so tests assert
//! on converged state rather than on event interleavings.

use std::time::Duration;

use scelle_session::transports::MemoryNetwork;
use scelle_session::{
    ClientConfig, ClientSession, Endpoint, GameSession, HostConfig, HostSession, SessionEvent,
};

/// How long a test waits for the session to converge before failing.
pub const CONVERGE_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A host configuration with timers shrunk to test scale.
pub fn fast_config() -> HostConfig {
    HostConfig::new()
        .with_tick_interval(Duration::from_millis(20))
        .with_sabotage_duration(Duration::from_millis(300))
        .with_alert_clear_delay(Duration::from_millis(150))
}

/// Start a host over a fresh in-memory network.
#[allow(clippy::type_complexity)]
pub fn start_host(
    config: HostConfig,
) -> (
    MemoryNetwork,
    HostSession,
    tokio::sync::mpsc::Receiver<SessionEvent>,
    String,
) {
    let network = MemoryNetwork::new();
    let endpoint = network.open();
    let code = endpoint.local_addr().to_string();
    let (host, events) = HostSession::start(endpoint, "Capitaine", config);
    (network, host, events, code)
}

/// Join a client to `code` and wait until the host's snapshot lists it.
pub async fn join_client(
    network: &MemoryNetwork,
    host: &HostSession,
    code: &str,
    name: &str,
) -> (
    ClientSession,
    tokio::sync::mpsc::Receiver<SessionEvent>,
) {
    let channel = network.connect(code).expect("connect to host");
    let (client, events) = ClientSession::join(channel, name, ClientConfig::new());
    let id = client.player_id();
    wait_for_host(host, |s| s.player(id).is_some()).await;
    // The welcome snapshot must also have landed on the client.
    wait_for(&client, |s| s.player(id).is_some()).await;
    (client, events)
}

/// Poll the client's mirror until `pred` holds, panicking on timeout.
pub async fn wait_for<F>(client: &ClientSession, pred: F) -> GameSession
where
    F: Fn(&GameSession) -> bool,
{
    let deadline = tokio::time::Instant::now() + CONVERGE_TIMEOUT;
    loop {
        if let Some(snapshot) = client.snapshot() {
            if pred(&snapshot) {
                return snapshot;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "client mirror did not converge within {CONVERGE_TIMEOUT:?}; last: {:?}",
                client.snapshot()
            );
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Poll the host's snapshot until `pred` holds, panicking on timeout.
pub async fn wait_for_host<F>(host: &HostSession, pred: F) -> GameSession
where
    F: Fn(&GameSession) -> bool,
{
    let deadline = tokio::time::Instant::now() + CONVERGE_TIMEOUT;
    loop {
        let snapshot = host.snapshot();
        if pred(&snapshot) {
            return snapshot;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("host state did not converge within {CONVERGE_TIMEOUT:?}; last: {snapshot:?}");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
