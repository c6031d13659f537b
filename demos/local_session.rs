//! # Local Session Example
//!
//! Runs a complete game session in one process over the in-memory
//! transport:
//!
//! 1. Start a host; its endpoint address becomes the session code
//! 2. Join three client terminals
//! 3. Start the game and let the host assign secret roles
//! 4. Have the infiltrator run a (shortened) sabotage to completion
//! 5. Shut everything down gracefully
//!
//! ## Running
//!
//! ```sh
//! cargo run --example local_session
//!
//! # Verbose output:
//! RUST_LOG=debug cargo run --example local_session
//! ```

use std::time::Duration;

use scelle_session::transports::MemoryNetwork;
use scelle_session::{
    ClientConfig, ClientSession, HostConfig, HostSession, Role, SessionEvent,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Host ────────────────────────────────────────────────────────
    // Shrink the timers so the demo finishes in seconds rather than the
    // real game's ten-minute countdown.
    let network = MemoryNetwork::new();
    let endpoint = network.open();
    let config = HostConfig::new()
        .with_sabotage_duration(Duration::from_secs(3))
        .with_alert_clear_delay(Duration::from_secs(2))
        .with_tick_interval(Duration::from_millis(200));

    let (mut host, host_events) = HostSession::start(endpoint, "Capitaine", config);
    let code = host.session_code().to_string();
    tracing::info!("Session open, code: {code}");
    tokio::spawn(print_events("host", host_events));

    // ── Clients ─────────────────────────────────────────────────────
    let mut clients = Vec::new();
    for name in ["Rossi", "Dubois", "Moreau"] {
        let channel = network.connect(&code)?;
        let (client, events) = ClientSession::join(channel, name, ClientConfig::new());
        tokio::spawn(print_events(name, events));
        clients.push(client);
    }

    // Let the joins land, then start the game.
    tokio::time::sleep(Duration::from_millis(300)).await;
    host.start_game()?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let snapshot = host.snapshot();
    for player in &snapshot.players {
        tracing::info!("{} drew role {:?}", player.name, player.role);
    }

    // ── Sabotage ────────────────────────────────────────────────────
    let infiltrator_id = snapshot
        .players
        .iter()
        .find(|p| p.role == Role::Infiltrated)
        .map(|p| p.id)
        .ok_or("no infiltrator assigned")?;
    let infiltrator = clients
        .iter()
        .find(|c| c.player_id() == infiltrator_id)
        .ok_or("infiltrator is not one of the clients")?;

    tracing::info!("Infiltrator starts the sabotage (3 s countdown)");
    infiltrator.sabotage_start()?;

    // Wait for the countdown to elapse on the host's clock.
    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let phase = host.snapshot().sabotage.phase;
        tracing::info!("Sabotage phase: {phase:?}");
        if phase == scelle_session::SabotagePhase::ReadyForUpload {
            break;
        }
    }

    infiltrator.complete_sabotage("img://demo/proof")?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = host.snapshot();
    tracing::info!(
        "Final state: phase {:?}, sabotage {:?}, proof {:?}",
        snapshot.phase,
        snapshot.sabotage.phase,
        snapshot.sabotage.proof_ref
    );

    // ── Shutdown ────────────────────────────────────────────────────
    for mut client in clients {
        client.shutdown().await;
    }
    host.shutdown().await;
    tracing::info!("Session closed");
    Ok(())
}

/// Print every event a terminal receives, until its stream ends.
async fn print_events(who: &'static str, mut events: tokio::sync::mpsc::Receiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connected => tracing::info!("[{who}] connected"),
            SessionEvent::SessionUpdated(session) => {
                tracing::debug!(
                    "[{who}] snapshot: {} players, phase {:?}",
                    session.players.len(),
                    session.phase
                );
            }
            SessionEvent::PeerJoined { name, .. } => {
                tracing::info!("[{who}] peer joined: {name}");
            }
            SessionEvent::PeerLeft { player_id } => {
                tracing::info!("[{who}] peer left: {player_id}");
            }
            SessionEvent::Disconnected { reason } => {
                tracing::info!("[{who}] disconnected: {reason:?}");
            }
        }
    }
}
