#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end session tests over the in-memory transport.
//!
//! Runs a real host loop plus real client loops wired together by a
//! [`MemoryNetwork`] and asserts on converged snapshots: the host's
//! authoritative copy and every client mirror must agree after each
//! command.

mod common;

use std::time::Duration;

use scelle_session::dispatch::{
    ALERT_SABOTAGE_COMPLETED, ALERT_SABOTAGE_DEFEATED, ALERT_SABOTAGE_STARTED,
};
use scelle_session::host::ALERT_CHRONOGRAM;
use scelle_session::protocol::{Envelope, GamePhase, Message, Player, Role};
use scelle_session::sabotage::SabotagePhase;
use scelle_session::transport::Channel;
use scelle_session::{ClientSession, SessionEvent};

use common::{fast_config, join_client, start_host, wait_for, wait_for_host};

/// Find the joined client whose assigned role matches, post-start.
fn client_with_role<'a>(
    clients: &'a mut [(ClientSession, tokio::sync::mpsc::Receiver<SessionEvent>)],
    snapshot: &scelle_session::GameSession,
    role: Role,
) -> &'a mut ClientSession {
    let id = snapshot
        .players
        .iter()
        .find(|p| p.role == role)
        .map(|p| p.id)
        .expect("role assigned to someone");
    clients
        .iter_mut()
        .map(|(client, _)| client)
        .find(|client| client.player_id() == id)
        .expect("role belongs to a joined client")
}

// ════════════════════════════════════════════════════════════════════
// Lobby
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn joins_converge_on_host_and_every_mirror() {
    let (network, host, _host_events, code) = start_host(fast_config());

    let (rossi, _rossi_events) = join_client(&network, &host, &code, "Rossi").await;
    let (dubois, _dubois_events) = join_client(&network, &host, &code, "Dubois").await;

    let snapshot = wait_for_host(&host, |s| s.players.len() == 3).await;
    assert_eq!(snapshot.phase, GamePhase::Lobby);
    assert_eq!(snapshot.code, code);

    // Both mirrors see all three players, including each other.
    wait_for(&rossi, |s| s.players.len() == 3).await;
    wait_for(&dubois, |s| s.players.len() == 3).await;
}

#[tokio::test]
async fn late_joiner_gets_the_snapshot_immediately() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let (_first, _first_events) = join_client(&network, &host, &code, "Rossi").await;

    // The welcome snapshot alone must already show the existing lobby;
    // no mutation happens after this join.
    let channel = network.connect(&code).expect("connect");
    let (late, mut late_events) =
        ClientSession::join(channel, "Tardif", scelle_session::ClientConfig::new());

    let ev = late_events.recv().await.expect("event");
    assert!(matches!(ev, SessionEvent::Connected));
    let ev = late_events.recv().await.expect("event");
    match ev {
        SessionEvent::SessionUpdated(session) => {
            assert!(session.players.iter().any(|p| p.name == "Rossi"));
        }
        other => panic!("expected the welcome snapshot, got {other:?}"),
    }

    wait_for_host(&host, |s| s.player(late.player_id()).is_some()).await;
}

#[tokio::test]
async fn duplicate_join_keeps_a_single_entry() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let (rossi, _rossi_events) = join_client(&network, &host, &code, "Rossi").await;

    rossi.rejoin().expect("rejoin");
    rossi.rejoin().expect("rejoin");

    // Give the duplicates time to be dispatched, then count entries.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = host.snapshot();
    let matching = snapshot
        .players
        .iter()
        .filter(|p| p.id == rossi.player_id())
        .count();
    assert_eq!(matching, 1);
}

#[tokio::test]
async fn lobby_disconnect_removes_the_player() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let (mut rossi, _rossi_events) = join_client(&network, &host, &code, "Rossi").await;
    let (dubois, _dubois_events) = join_client(&network, &host, &code, "Dubois").await;

    let gone = rossi.player_id();
    rossi.shutdown().await;

    wait_for_host(&host, |s| s.player(gone).is_none()).await;
    // The surviving mirror sees the removal too.
    wait_for(&dubois, |s| s.player(gone).is_none()).await;
}

#[tokio::test]
async fn malformed_peer_input_is_ignored() {
    let (network, host, _host_events, code) = start_host(fast_config());

    let mut raw = network.connect(&code).expect("connect");
    raw.send("{definitely not json".to_string())
        .await
        .expect("send garbage");
    raw.send(r#"{"type": "SELF_DESTRUCT"}"#.to_string())
        .await
        .expect("send unknown tag");

    // The connection survives and a valid JOIN on it still lands.
    let player = Player::new("Rossi", Role::Guard);
    let id = player.id;
    let join = serde_json::to_string(&Envelope::command(Message::Join(player), id))
        .expect("serialize");
    raw.send(join).await.expect("send join");

    wait_for_host(&host, |s| s.player(id).is_some()).await;
}

// ════════════════════════════════════════════════════════════════════
// Game start
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn start_is_refused_below_the_minimum() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let (_rossi, _rossi_events) = join_client(&network, &host, &code, "Rossi").await;

    host.start_game().expect("queue start");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(host.snapshot().phase, GamePhase::Lobby);

    // A second joiner crosses the threshold; the next start succeeds.
    let (_dubois, _dubois_events) = join_client(&network, &host, &code, "Dubois").await;
    host.start_game().expect("queue start");
    wait_for_host(&host, |s| s.phase == GamePhase::Active).await;
}

#[tokio::test]
async fn start_assigns_exactly_one_of_each_special_role() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let (rossi, _rossi_events) = join_client(&network, &host, &code, "Rossi").await;
    let (_dubois, _dubois_events) = join_client(&network, &host, &code, "Dubois").await;
    let (_moreau, _moreau_events) = join_client(&network, &host, &code, "Moreau").await;

    host.start_game().expect("queue start");
    let snapshot = wait_for_host(&host, |s| s.phase == GamePhase::Active).await;

    let count = |role| snapshot.players.iter().filter(|p| p.role == role).count();
    assert_eq!(count(Role::Host), 1);
    assert_eq!(count(Role::Infiltrated), 1);
    assert_eq!(count(Role::IntelOfficer), 1);
    assert_eq!(count(Role::Guard), 1);
    assert_eq!(snapshot.role_of(host.host_id()), Some(Role::Host));

    // Mirrors receive the same assignment, not a re-roll.
    let mirrored = wait_for(&rossi, |s| s.phase == GamePhase::Active).await;
    for player in &snapshot.players {
        assert_eq!(
            mirrored.player(player.id).map(|p| p.role),
            Some(player.role)
        );
    }
}

#[tokio::test]
async fn reconnecting_player_reclaims_their_seat() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let (mut rossi, _rossi_events) = join_client(&network, &host, &code, "Rossi").await;
    let (_dubois, _dubois_events) = join_client(&network, &host, &code, "Dubois").await;

    host.start_game().expect("queue start");
    let snapshot = wait_for_host(&host, |s| s.phase == GamePhase::Active).await;
    let seat = snapshot.player(rossi.player_id()).expect("seated").clone();

    rossi.shutdown().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(host.snapshot().player(seat.id).is_some());

    let channel = network.connect(&code).expect("connect");
    let (resumed, _resumed_events) =
        ClientSession::resume(channel, seat.clone(), scelle_session::ClientConfig::new());
    assert_eq!(resumed.player_id(), seat.id);

    // The welcome snapshot reseats the terminal; no second entry, same
    // secret role.
    let mirrored = wait_for(&resumed, |s| s.player(seat.id).is_some()).await;
    let entries = |s: &scelle_session::GameSession| {
        s.players.iter().filter(|p| p.name == "Rossi").count()
    };
    assert_eq!(entries(&mirrored), 1);
    assert_eq!(entries(&host.snapshot()), 1);
    assert_eq!(mirrored.role_of(seat.id), Some(seat.role));

    // Later broadcasts reach the resumed channel.
    host.trigger_bip().expect("trigger");
    wait_for(&resumed, |s| s.phase == GamePhase::Alarm).await;
}

#[tokio::test]
async fn active_disconnect_keeps_the_player_seated() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let (mut rossi, _rossi_events) = join_client(&network, &host, &code, "Rossi").await;
    let (_dubois, _dubois_events) = join_client(&network, &host, &code, "Dubois").await;

    host.start_game().expect("queue start");
    wait_for_host(&host, |s| s.phase == GamePhase::Active).await;

    let seat = rossi.player_id();
    rossi.shutdown().await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Mid-game the seat survives so the session can continue.
    assert!(host.snapshot().player(seat).is_some());
}

// ════════════════════════════════════════════════════════════════════
// BIP alarm
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn any_player_triggers_bip_but_only_the_host_releases() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let (rossi, _rossi_events) = join_client(&network, &host, &code, "Rossi").await;
    let (_dubois, _dubois_events) = join_client(&network, &host, &code, "Dubois").await;

    host.start_game().expect("queue start");
    wait_for(&rossi, |s| s.phase == GamePhase::Active).await;

    rossi.trigger_bip().expect("trigger");
    wait_for_host(&host, |s| s.phase == GamePhase::Alarm).await;
    wait_for(&rossi, |s| s.phase == GamePhase::Alarm).await;

    // A non-host release is refused.
    rossi.release_bip().expect("queue release");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(host.snapshot().phase, GamePhase::Alarm);

    host.release_bip().expect("release");
    let snapshot = wait_for_host(&host, |s| s.phase == GamePhase::Active).await;
    assert!(snapshot.alert_msg.is_none());
    wait_for(&rossi, |s| s.phase == GamePhase::Active).await;
}

// ════════════════════════════════════════════════════════════════════
// Sabotage
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sabotage_report_defeats_and_the_banner_clears_itself() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let mut clients = Vec::new();
    for name in ["Rossi", "Dubois", "Moreau"] {
        clients.push(join_client(&network, &host, &code, name).await);
    }

    host.start_game().expect("queue start");
    let snapshot = wait_for_host(&host, |s| s.phase == GamePhase::Active).await;

    client_with_role(&mut clients, &snapshot, Role::Infiltrated)
        .sabotage_start()
        .expect("start sabotage");
    let snapshot = wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::Pending).await;
    assert_eq!(snapshot.alert_msg.as_deref(), Some(ALERT_SABOTAGE_STARTED));
    assert!(snapshot.sabotage.started_at_ms.is_some());

    client_with_role(&mut clients, &snapshot, Role::Guard)
        .report_sabotage()
        .expect("report");
    let snapshot =
        wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::Defeated).await;
    assert!(!snapshot.sabotage.active);
    assert_eq!(snapshot.alert_msg.as_deref(), Some(ALERT_SABOTAGE_DEFEATED));

    // fast_config clears the banner after 150 ms; the defeat state stays.
    let snapshot = wait_for_host(&host, |s| s.alert_msg.is_none()).await;
    assert_eq!(snapshot.sabotage.phase, SabotagePhase::Defeated);
    let (guard, _) = &clients[0];
    wait_for(guard, |s| s.alert_msg.is_none()).await;
}

#[tokio::test]
async fn infiltrator_cannot_report_their_own_sabotage() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let mut clients = Vec::new();
    for name in ["Rossi", "Dubois"] {
        clients.push(join_client(&network, &host, &code, name).await);
    }

    host.start_game().expect("queue start");
    let snapshot = wait_for_host(&host, |s| s.phase == GamePhase::Active).await;

    let infiltrator = client_with_role(&mut clients, &snapshot, Role::Infiltrated);
    infiltrator.sabotage_start().expect("start sabotage");
    wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::Pending).await;

    infiltrator.report_sabotage().expect("queue report");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(host.snapshot().sabotage.phase, SabotagePhase::Pending);
}

#[tokio::test]
async fn sabotage_countdown_reaches_ready_then_completes_with_proof() {
    // 300 ms countdown, 20 ms tick (fast_config).
    let (network, host, _host_events, code) = start_host(fast_config());
    let mut clients = Vec::new();
    for name in ["Rossi", "Dubois"] {
        clients.push(join_client(&network, &host, &code, name).await);
    }

    host.start_game().expect("queue start");
    let snapshot = wait_for_host(&host, |s| s.phase == GamePhase::Active).await;

    let infiltrator = client_with_role(&mut clients, &snapshot, Role::Infiltrated);
    infiltrator.sabotage_start().expect("start sabotage");

    // The countdown elapses on the host's clock and the transition is
    // broadcast; no client input is involved.
    wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::ReadyForUpload).await;
    let infiltrator = client_with_role(&mut clients, &snapshot, Role::Infiltrated);
    wait_for(infiltrator, |s| {
        s.sabotage.phase == SabotagePhase::ReadyForUpload
    })
    .await;

    infiltrator
        .complete_sabotage("img://seal/proof-1")
        .expect("complete");
    let snapshot =
        wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::Completed).await;
    assert_eq!(
        snapshot.sabotage.proof_ref.as_deref(),
        Some("img://seal/proof-1")
    );
    assert_eq!(
        snapshot.alert_msg.as_deref(),
        Some(ALERT_SABOTAGE_COMPLETED)
    );
    assert!(!snapshot.sabotage.active);
}

#[tokio::test]
async fn defeated_sabotage_can_be_restarted() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let mut clients = Vec::new();
    for name in ["Rossi", "Dubois", "Moreau"] {
        clients.push(join_client(&network, &host, &code, name).await);
    }

    host.start_game().expect("queue start");
    let snapshot = wait_for_host(&host, |s| s.phase == GamePhase::Active).await;

    client_with_role(&mut clients, &snapshot, Role::Infiltrated)
        .sabotage_start()
        .expect("first start");
    wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::Pending).await;
    client_with_role(&mut clients, &snapshot, Role::Guard)
        .report_sabotage()
        .expect("report");
    wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::Defeated).await;

    client_with_role(&mut clients, &snapshot, Role::Infiltrated)
        .sabotage_start()
        .expect("second start");
    let snapshot = wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::Pending).await;
    assert!(snapshot.sabotage.active);
    assert!(snapshot.sabotage.proof_ref.is_none());
}

#[tokio::test]
async fn restarted_sabotage_banner_survives_the_stale_clear_deadline() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let mut clients = Vec::new();
    for name in ["Rossi", "Dubois", "Moreau"] {
        clients.push(join_client(&network, &host, &code, name).await);
    }

    host.start_game().expect("queue start");
    let snapshot = wait_for_host(&host, |s| s.phase == GamePhase::Active).await;

    // Defeat arms the 150 ms banner clear (fast_config).
    client_with_role(&mut clients, &snapshot, Role::Infiltrated)
        .sabotage_start()
        .expect("first start");
    wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::Pending).await;
    client_with_role(&mut clients, &snapshot, Role::Guard)
        .report_sabotage()
        .expect("report");
    wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::Defeated).await;

    // Restart before the deadline fires: the fresh banner belongs to
    // the new sabotage and must outlive the defeat's clear deadline.
    client_with_role(&mut clients, &snapshot, Role::Infiltrated)
        .sabotage_start()
        .expect("second start");
    wait_for_host(&host, |s| s.sabotage.phase == SabotagePhase::Pending).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        host.snapshot().alert_msg.as_deref(),
        Some(ALERT_SABOTAGE_STARTED)
    );
}

// ════════════════════════════════════════════════════════════════════
// Chronogram
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn chronogram_raises_then_clears_the_sync_banner() {
    let due = unix_now_ms() + 100;
    let config = fast_config().with_chronogram_ms(vec![due]);
    let (network, host, _host_events, code) = start_host(config);
    let (rossi, _rossi_events) = join_client(&network, &host, &code, "Rossi").await;

    let snapshot = wait_for_host(&host, |s| s.alert_msg.is_some()).await;
    assert_eq!(snapshot.alert_msg.as_deref(), Some(ALERT_CHRONOGRAM));
    wait_for(&rossi, |s| s.alert_msg.as_deref() == Some(ALERT_CHRONOGRAM)).await;

    // fast_config clears the banner 150 ms later; only the banner goes.
    let snapshot = wait_for_host(&host, |s| s.alert_msg.is_none()).await;
    assert_eq!(snapshot.phase, GamePhase::Lobby);
}

fn unix_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before the Unix epoch")
        .as_millis() as u64
}

// ════════════════════════════════════════════════════════════════════
// Intel check
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn intel_check_is_consumed_exactly_once() {
    let (network, host, _host_events, code) = start_host(fast_config());
    let mut clients = Vec::new();
    for name in ["Rossi", "Dubois"] {
        clients.push(join_client(&network, &host, &code, name).await);
    }

    host.start_game().expect("queue start");
    let snapshot = wait_for_host(&host, |s| s.phase == GamePhase::Active).await;

    let officer = client_with_role(&mut clients, &snapshot, Role::IntelOfficer);
    officer.use_intel().expect("first use");
    wait_for_host(&host, |s| s.intel_check_used).await;

    officer.use_intel().expect("second use");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(host.snapshot().intel_check_used);
}

// ════════════════════════════════════════════════════════════════════
// Shutdown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn host_shutdown_disconnects_every_client() {
    let (network, mut host, mut host_events, code) = start_host(fast_config());
    let (rossi, mut rossi_events) = join_client(&network, &host, &code, "Rossi").await;

    host.shutdown().await;
    assert!(!host.is_running());
    assert!(matches!(
        host.start_game(),
        Err(scelle_session::SessionError::SessionClosed)
    ));

    // The host's own stream ends with Disconnected.
    let mut saw_host_disconnect = false;
    while let Some(ev) = host_events.recv().await {
        if matches!(ev, SessionEvent::Disconnected { .. }) {
            saw_host_disconnect = true;
        }
    }
    assert!(saw_host_disconnect);

    // The client observes the closed channel and reports Disconnected.
    let mut saw_client_disconnect = false;
    while let Some(ev) = rossi_events.recv().await {
        if matches!(ev, SessionEvent::Disconnected { .. }) {
            saw_client_disconnect = true;
        }
    }
    assert!(saw_client_disconnect);
    assert!(!rossi.is_connected());
}
