//! Wire protocol and session data model.
//!
//! Every terminal exchanges JSON text messages shaped as an [`Envelope`]:
//! a `type` tag, an optional command-specific `payload`, and an optional
//! `senderId`. The tag names (`JOIN`, `SYNC_SESSION`, …) are part of the
//! wire contract and must not change.
//!
//! [`GameSession`] is the single source of truth for a running game. It is
//! owned by the host terminal and mirrored, read-only, by every client;
//! clients only ever replace their copy wholesale when a `SYNC_SESSION`
//! snapshot arrives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sabotage::SabotageState;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for players.
pub type PlayerId = Uuid;

// ── Enums ───────────────────────────────────────────────────────────

/// Secret role assigned to a player.
///
/// The host keeps [`Role::Host`] for the whole session; every other
/// player starts as [`Role::Guard`] in the lobby and is reassigned
/// exactly once, at game start, by the role assigner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Session owner; the only writer of the authoritative state.
    Host,
    /// Regular crew member.
    Guard,
    /// The saboteur with a timed objective.
    Infiltrated,
    /// Holder of the one-shot intelligence check.
    IntelOfficer,
}

/// Top-level game phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    /// Waiting for players to join; the only phase where disconnects
    /// remove players from the session.
    #[default]
    Lobby,
    /// Roles assigned, game running.
    Active,
    /// Everyone summoned by the BIP alarm.
    Alarm,
    /// Game over.
    Finished,
}

// ── Structs ─────────────────────────────────────────────────────────

/// A player in the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    pub neutralised: bool,
}

impl Player {
    /// Create a fresh player with a random identifier and the given role.
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            neutralised: false,
        }
    }
}

/// The authoritative session state.
///
/// Held in memory by the host, discarded when the host process ends.
/// Mutations replace the value wholesale; there are no partial patches
/// on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    /// Human-shared session code: the host's transport address, verbatim.
    pub code: String,
    /// Players in join order. Identifiers are unique.
    pub players: Vec<Player>,
    pub phase: GamePhase,
    pub sabotage: SabotageState,
    /// One-shot flag: set once the intel officer's check is consumed,
    /// never cleared for the rest of the session.
    pub intel_check_used: bool,
    /// Transient banner shown on every terminal; cleared by the host
    /// after a fixed delay for some commands.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alert_msg: Option<String>,
    /// Reserved accusation-vote map (voter → accused). Stored and
    /// synchronized, but not resolved by the core.
    #[serde(default)]
    pub votes: BTreeMap<PlayerId, PlayerId>,
}

impl GameSession {
    /// Create a fresh lobby session owned by `host`.
    pub fn new(code: impl Into<String>, host: Player) -> Self {
        Self {
            code: code.into(),
            players: vec![host],
            phase: GamePhase::Lobby,
            sabotage: SabotageState::default(),
            intel_check_used: false,
            alert_msg: None,
            votes: BTreeMap::new(),
        }
    }

    /// Look up a player by identifier.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Role of the given sender, if they are in the session.
    pub fn role_of(&self, id: PlayerId) -> Option<Role> {
        self.player(id).map(|p| p.role)
    }

    /// Append a player unless the identifier is already present.
    ///
    /// Returns `true` if the list changed. Duplicate joins (e.g. a retry
    /// after a reconnect) are a no-op, keeping JOIN idempotent.
    pub fn add_player(&mut self, player: Player) -> bool {
        if self.players.iter().any(|p| p.id == player.id) {
            return false;
        }
        self.players.push(player);
        true
    }

    /// Remove a player by identifier. Returns `true` if one was removed.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.id != id);
        self.players.len() != before
    }

    /// Number of players other than the host.
    pub fn non_host_count(&self) -> usize {
        self.players.iter().filter(|p| p.role != Role::Host).count()
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Typed message body carried inside an [`Envelope`].
///
/// `SyncSession` is the only host-to-client message; everything else is
/// a host-bound command. Tags are the wire names shared with every
/// client implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Request to add a player to the session (idempotent per player id).
    Join(Player),
    /// Full state snapshot; replaces the receiver's view wholesale.
    /// Boxed to keep the enum small.
    SyncSession(Box<GameSession>),
    /// Infiltrated player starts the timed sabotage.
    SabotageStart,
    /// A guard reports the sabotage, defeating it.
    SabotageReport,
    /// Sabotage finished; payload is the proof-image reference.
    SabotageComplete(String),
    /// Sound the BIP alarm.
    BipTrigger,
    /// Host stands the alarm down.
    BipRelease,
    /// Consume the one-shot intel check.
    CodisUse,
}

/// Wire envelope: `{ "type": …, "payload": …, "senderId": … }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub message: Message,
    /// Identifier of the terminal that issued the command. Absent on
    /// `SYNC_SESSION` and on a client's very first `JOIN` retry path.
    #[serde(
        rename = "senderId",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub sender_id: Option<PlayerId>,
}

impl Envelope {
    /// Wrap a host-bound command with its sender.
    pub fn command(message: Message, sender_id: PlayerId) -> Self {
        Self {
            message,
            sender_id: Some(sender_id),
        }
    }

    /// Wrap a full-state snapshot for broadcast.
    pub fn sync(session: &GameSession) -> Self {
        Self {
            message: Message::SyncSession(Box::new(session.clone())),
            sender_id: None,
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

    #[test]
    fn join_is_idempotent_per_id() {
        let host = Player::new("Capitaine", Role::Host);
        let mut session = GameSession::new("CODE-1", host);

        let joiner = Player::new("Rossi", Role::Guard);
        assert!(session.add_player(joiner.clone()));
        assert!(!session.add_player(joiner.clone()));
        assert!(!session.add_player(joiner));

        assert_eq!(session.players.len(), 2);
        assert_eq!(session.non_host_count(), 1);
    }

    #[test]
    fn remove_player_reports_change() {
        let host = Player::new("Capitaine", Role::Host);
        let mut session = GameSession::new("CODE-1", host);
        let joiner = Player::new("Rossi", Role::Guard);
        let id = joiner.id;
        session.add_player(joiner);

        assert!(session.remove_player(id));
        assert!(!session.remove_player(id));
        assert_eq!(session.players.len(), 1);
    }

    #[test]
    fn envelope_uses_wire_tag_names() {
        let host = Player::new("Capitaine", Role::Host);
        let env = Envelope::command(Message::Join(host.clone()), host.id);
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();

        assert_eq!(json["type"], "JOIN");
        assert_eq!(json["senderId"], serde_json::json!(host.id));
        assert_eq!(json["payload"]["role"], "HOST");
    }

    #[test]
    fn unit_command_omits_payload_and_round_trips() {
        let sender = Uuid::new_v4();
        let env = Envelope::command(Message::BipTrigger, sender);
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"type\":\"BIP_TRIGGER\""));

        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.message, Message::BipTrigger));
        assert_eq!(back.sender_id, Some(sender));
    }

    #[test]
    fn sync_session_round_trips_full_state() {
        let host = Player::new("Capitaine", Role::Host);
        let session = GameSession::new("CODE-9", host);
        let env = Envelope::sync(&session);

        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        match back.message {
            Message::SyncSession(snapshot) => {
                assert_eq!(snapshot.code, "CODE-9");
                assert_eq!(snapshot.players.len(), 1);
            }
            other => panic!("expected SyncSession, got {other:?}"),
        }
    }
}
