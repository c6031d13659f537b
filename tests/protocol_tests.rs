#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the session protocol.
//!
//! Verifies the envelope shape (`type` / `payload` / `senderId`), the
//! exact SCREAMING_SNAKE_CASE tag of every message variant, and JSON
//! fixtures matching what non-Rust terminals put on the wire.

use scelle_session::protocol::{Envelope, GamePhase, GameSession, Message, Player, Role};
use scelle_session::sabotage::SabotagePhase;

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Serialize `val` to JSON, then deserialize back and return it.
fn round_trip<T: serde::Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
    let json = serde_json::to_string(val).expect("serialize");
    serde_json::from_str(&json).expect("deserialize")
}

fn test_uuid(n: u128) -> uuid::Uuid {
    uuid::Uuid::from_u128(n)
}

fn sample_player(n: u128, role: Role) -> Player {
    Player {
        id: test_uuid(n),
        name: format!("agent-{n}"),
        role,
        neutralised: false,
    }
}

fn tag_of(message: Message) -> String {
    let env = Envelope::command(message, test_uuid(1));
    let json: serde_json::Value = serde_json::to_value(&env).expect("serialize");
    json["type"].as_str().expect("string tag").to_string()
}

// ════════════════════════════════════════════════════════════════════
// Envelope shape
// ════════════════════════════════════════════════════════════════════

#[test]
fn every_command_tag_matches_the_wire_contract() {
    assert_eq!(tag_of(Message::Join(sample_player(1, Role::Guard))), "JOIN");
    assert_eq!(tag_of(Message::SabotageStart), "SABOTAGE_START");
    assert_eq!(tag_of(Message::SabotageReport), "SABOTAGE_REPORT");
    assert_eq!(
        tag_of(Message::SabotageComplete("img://p".into())),
        "SABOTAGE_COMPLETE"
    );
    assert_eq!(tag_of(Message::BipTrigger), "BIP_TRIGGER");
    assert_eq!(tag_of(Message::BipRelease), "BIP_RELEASE");
    assert_eq!(tag_of(Message::CodisUse), "CODIS_USE");
}

#[test]
fn command_envelope_carries_sender_id() {
    let sender = test_uuid(7);
    let env = Envelope::command(Message::BipTrigger, sender);
    let json: serde_json::Value = serde_json::to_value(&env).expect("serialize");
    assert_eq!(json["senderId"], serde_json::json!(sender));
}

#[test]
fn sync_envelope_omits_sender_id() {
    let session = GameSession::new("SCL-1", sample_player(1, Role::Host));
    let env = Envelope::sync(&session);
    let json: serde_json::Value = serde_json::to_value(&env).expect("serialize");
    assert_eq!(json["type"], "SYNC_SESSION");
    assert!(json.get("senderId").is_none());
}

#[test]
fn unit_commands_have_no_payload_key() {
    let env = Envelope::command(Message::CodisUse, test_uuid(3));
    let json: serde_json::Value = serde_json::to_value(&env).expect("serialize");
    assert!(json.get("payload").is_none());
}

// ════════════════════════════════════════════════════════════════════
// Fixtures from non-Rust terminals
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_fixture_parses() {
    let raw = r#"{
        "type": "JOIN",
        "payload": {
            "id": "00000000-0000-0000-0000-00000000002a",
            "name": "Rossi",
            "role": "GUARD",
            "neutralised": false
        },
        "senderId": "00000000-0000-0000-0000-00000000002a"
    }"#;
    let env: Envelope = serde_json::from_str(raw).expect("deserialize");
    match env.message {
        Message::Join(player) => {
            assert_eq!(player.id, test_uuid(42));
            assert_eq!(player.name, "Rossi");
            assert_eq!(player.role, Role::Guard);
            assert!(!player.neutralised);
        }
        other => panic!("expected JOIN, got {other:?}"),
    }
    assert_eq!(env.sender_id, Some(test_uuid(42)));
}

#[test]
fn sabotage_complete_fixture_parses() {
    let raw = r#"{
        "type": "SABOTAGE_COMPLETE",
        "payload": "img://proof/818",
        "senderId": "00000000-0000-0000-0000-000000000009"
    }"#;
    let env: Envelope = serde_json::from_str(raw).expect("deserialize");
    match env.message {
        Message::SabotageComplete(proof) => assert_eq!(proof, "img://proof/818"),
        other => panic!("expected SABOTAGE_COMPLETE, got {other:?}"),
    }
}

#[test]
fn command_without_sender_id_parses() {
    // A terminal may race its first commands before it knows its id.
    let raw = r#"{"type": "BIP_TRIGGER"}"#;
    let env: Envelope = serde_json::from_str(raw).expect("deserialize");
    assert!(matches!(env.message, Message::BipTrigger));
    assert_eq!(env.sender_id, None);
}

#[test]
fn unknown_tag_is_a_deserialize_error() {
    let raw = r#"{"type": "SELF_DESTRUCT", "senderId": null}"#;
    assert!(serde_json::from_str::<Envelope>(raw).is_err());
}

#[test]
fn sync_fixture_with_missing_optionals_parses() {
    // `alertMsg`-style optionals and the votes map may be absent entirely.
    let raw = r#"{
        "type": "SYNC_SESSION",
        "payload": {
            "code": "SCL-9XK2",
            "players": [
                {
                    "id": "00000000-0000-0000-0000-000000000001",
                    "name": "Capitaine",
                    "role": "HOST",
                    "neutralised": false
                }
            ],
            "phase": "LOBBY",
            "sabotage": { "active": false, "phase": "IDLE" },
            "intel_check_used": false
        }
    }"#;
    let env: Envelope = serde_json::from_str(raw).expect("deserialize");
    match env.message {
        Message::SyncSession(session) => {
            assert_eq!(session.code, "SCL-9XK2");
            assert_eq!(session.phase, GamePhase::Lobby);
            assert_eq!(session.sabotage.phase, SabotagePhase::Idle);
            assert!(session.alert_msg.is_none());
            assert!(session.votes.is_empty());
            assert_eq!(session.sabotage.started_at_ms, None);
        }
        other => panic!("expected SYNC_SESSION, got {other:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// Data model round trips
// ════════════════════════════════════════════════════════════════════

#[test]
fn role_and_phase_tags_are_screaming_snake_case() {
    assert_eq!(
        serde_json::to_string(&Role::IntelOfficer).expect("serialize"),
        "\"INTEL_OFFICER\""
    );
    assert_eq!(
        serde_json::to_string(&Role::Infiltrated).expect("serialize"),
        "\"INFILTRATED\""
    );
    assert_eq!(
        serde_json::to_string(&GamePhase::Alarm).expect("serialize"),
        "\"ALARM\""
    );
    assert_eq!(
        serde_json::to_string(&SabotagePhase::ReadyForUpload).expect("serialize"),
        "\"READY_FOR_UPLOAD\""
    );
}

#[test]
fn full_session_round_trips() {
    let mut session = GameSession::new("SCL-AB12", sample_player(1, Role::Host));
    session.add_player(sample_player(2, Role::Infiltrated));
    session.add_player(sample_player(3, Role::IntelOfficer));
    session.phase = GamePhase::Active;
    session.intel_check_used = true;
    session.alert_msg = Some("SEAL INTEGRITY COMPROMISED".into());
    session.votes.insert(test_uuid(2), test_uuid(3));
    session.sabotage.start(1_725_000_000_000);

    let back = round_trip(&session);
    assert_eq!(back.code, "SCL-AB12");
    assert_eq!(back.players.len(), 3);
    assert_eq!(back.phase, GamePhase::Active);
    assert!(back.intel_check_used);
    assert_eq!(back.alert_msg.as_deref(), Some("SEAL INTEGRITY COMPROMISED"));
    assert_eq!(back.votes.get(&test_uuid(2)), Some(&test_uuid(3)));
    assert_eq!(back.sabotage.phase, SabotagePhase::Pending);
    assert_eq!(back.sabotage.started_at_ms, Some(1_725_000_000_000));
}

#[test]
fn completed_sabotage_round_trips_with_proof() {
    let mut session = GameSession::new("SCL-1", sample_player(1, Role::Host));
    session.sabotage.start(0);
    session.sabotage.tick(600_000, 600_000);
    session.sabotage.complete("img://proof/1");

    let back = round_trip(&session);
    assert_eq!(back.sabotage.phase, SabotagePhase::Completed);
    assert_eq!(back.sabotage.proof_ref.as_deref(), Some("img://proof/1"));
    assert!(!back.sabotage.active);
}
