//! Host-side action dispatcher.
//!
//! [`apply`] is the single entry point through which the authoritative
//! [`GameSession`] is mutated. The host loop feeds it one command at a
//! time from its serialized queue, so there is never a concurrent writer
//! and no locking around the session value.
//!
//! Commands are role-tagged at dispatch: the sender's role is looked up
//! in the current player list, and owner-restricted commands are rejected
//! here rather than trusting the presentation layer to hide a button.

use crate::protocol::{GamePhase, GameSession, Message, Player, PlayerId, Role};
use crate::roles::assign_roles;

/// Banner raised while a sabotage countdown is running.
pub const ALERT_SABOTAGE_STARTED: &str = "SEAL INTEGRITY COMPROMISED";
/// Banner raised when a guard defeats the sabotage.
pub const ALERT_SABOTAGE_DEFEATED: &str = "SABOTAGE DEFEATED";
/// Banner raised when the infiltrator completes the sabotage.
pub const ALERT_SABOTAGE_COMPLETED: &str = "SABOTAGE SUCCESSFUL — SEAL NEUTRALISED";

/// A command the dispatcher can apply.
///
/// Wire commands convert via [`Command::from_wire`]; [`Command::StartGame`]
/// exists only host-locally (there is no wire message for it).
#[derive(Debug, Clone)]
pub enum Command {
    Join(Player),
    /// Host-local: assign roles and move the lobby to `Active`.
    StartGame,
    SabotageStart,
    SabotageReport,
    SabotageComplete(String),
    BipTrigger,
    BipRelease,
    CodisUse,
}

impl Command {
    /// Convert an inbound wire message into a command.
    ///
    /// Returns `None` for `SYNC_SESSION`, which is host-to-client only;
    /// a client echoing one back is a protocol error handled as a silent
    /// no-op.
    pub fn from_wire(message: Message) -> Option<Self> {
        match message {
            Message::Join(player) => Some(Self::Join(player)),
            Message::SabotageStart => Some(Self::SabotageStart),
            Message::SabotageReport => Some(Self::SabotageReport),
            Message::SabotageComplete(proof) => Some(Self::SabotageComplete(proof)),
            Message::BipTrigger => Some(Self::BipTrigger),
            Message::BipRelease => Some(Self::BipRelease),
            Message::CodisUse => Some(Self::CodisUse),
            Message::SyncSession(_) => None,
        }
    }
}

/// Result of applying a command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Outcome {
    /// Whether the session changed; every change triggers exactly one
    /// broadcast in the host loop.
    pub changed: bool,
    /// Ask the host loop to clear `alert_msg` after its configured delay
    /// (which triggers a second, independent broadcast).
    pub schedule_alert_clear: bool,
}

impl Outcome {
    const NOOP: Self = Self {
        changed: false,
        schedule_alert_clear: false,
    };

    const CHANGED: Self = Self {
        changed: true,
        schedule_alert_clear: false,
    };
}

/// Apply `command` from `sender` to the session at wall-clock `now_ms`.
///
/// Unknown senders carry no role and fail every role gate. Commands that
/// are not meaningful in the current state are silent no-ops; no branch
/// here is an error.
pub fn apply<R: rand::Rng>(
    session: &mut GameSession,
    command: Command,
    sender: Option<PlayerId>,
    now_ms: u64,
    min_players_to_start: usize,
    rng: &mut R,
) -> Outcome {
    let sender_role = sender.and_then(|id| session.role_of(id));

    match command {
        Command::Join(player) => {
            if session.add_player(player) {
                Outcome::CHANGED
            } else {
                tracing::debug!("duplicate JOIN ignored");
                Outcome::NOOP
            }
        }

        Command::StartGame => {
            if sender_role != Some(Role::Host) {
                tracing::warn!(?sender, "start refused: sender is not the host");
                return Outcome::NOOP;
            }
            if session.phase != GamePhase::Lobby {
                return Outcome::NOOP;
            }
            if session.non_host_count() < min_players_to_start {
                tracing::debug!(
                    players = session.non_host_count(),
                    required = min_players_to_start,
                    "start refused: not enough players"
                );
                return Outcome::NOOP;
            }
            assign_roles(&mut session.players, rng);
            session.phase = GamePhase::Active;
            Outcome::CHANGED
        }

        Command::SabotageStart => {
            if session.sabotage.start(now_ms) {
                session.alert_msg = Some(ALERT_SABOTAGE_STARTED.to_string());
                Outcome::CHANGED
            } else {
                Outcome::NOOP
            }
        }

        Command::SabotageReport => {
            // Only the crew can defeat a sabotage; the host moderates and
            // the infiltrator obviously doesn't report themselves.
            if matches!(sender_role, Some(Role::Host) | Some(Role::Infiltrated) | None) {
                tracing::debug!(?sender_role, "sabotage report ignored");
                return Outcome::NOOP;
            }
            if session.sabotage.report() {
                session.alert_msg = Some(ALERT_SABOTAGE_DEFEATED.to_string());
                Outcome {
                    changed: true,
                    schedule_alert_clear: true,
                }
            } else {
                Outcome::NOOP
            }
        }

        Command::SabotageComplete(proof_ref) => {
            if session.sabotage.complete(proof_ref) {
                session.alert_msg = Some(ALERT_SABOTAGE_COMPLETED.to_string());
                Outcome::CHANGED
            } else {
                Outcome::NOOP
            }
        }

        Command::BipTrigger => {
            if session.phase == GamePhase::Active {
                session.phase = GamePhase::Alarm;
                Outcome::CHANGED
            } else {
                Outcome::NOOP
            }
        }

        Command::BipRelease => {
            // Owner-restricted: only the session owner stands the alarm down.
            if sender_role != Some(Role::Host) {
                tracing::warn!(?sender, "BIP release refused: sender is not the host");
                return Outcome::NOOP;
            }
            if session.phase == GamePhase::Alarm {
                session.phase = GamePhase::Active;
                session.alert_msg = None;
                Outcome::CHANGED
            } else {
                Outcome::NOOP
            }
        }

        Command::CodisUse => {
            if session.intel_check_used {
                return Outcome::NOOP;
            }
            session.intel_check_used = true;
            Outcome::CHANGED
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
    use crate::sabotage::SabotagePhase;

    const MIN_PLAYERS: usize = 2;

    fn lobby() -> (GameSession, PlayerId) {
        let host = Player::new("Capitaine", Role::Host);
        let host_id = host.id;
        (GameSession::new("TEST-1", host), host_id)
    }

    fn dispatch(
        session: &mut GameSession,
        command: Command,
        sender: Option<PlayerId>,
    ) -> Outcome {
        apply(
            session,
            command,
            sender,
            0,
            MIN_PLAYERS,
            &mut rand::thread_rng(),
        )
    }

    fn started(joiners: usize) -> (GameSession, PlayerId) {
        let (mut session, host_id) = lobby();
        for i in 0..joiners {
            let p = Player::new(format!("Garde {i}"), Role::Guard);
            dispatch(&mut session, Command::Join(p), None);
        }
        let out = dispatch(&mut session, Command::StartGame, Some(host_id));
        assert!(out.changed);
        (session, host_id)
    }

    fn player_with_role(session: &GameSession, role: Role) -> PlayerId {
        session
            .players
            .iter()
            .find(|p| p.role == role)
            .map(|p| p.id)
            .unwrap()
    }

    #[test]
    fn repeated_join_keeps_one_entry() {
        let (mut session, _) = lobby();
        let joiner = Player::new("Rossi", Role::Guard);

        assert!(dispatch(&mut session, Command::Join(joiner.clone()), None).changed);
        assert!(!dispatch(&mut session, Command::Join(joiner.clone()), None).changed);
        assert!(!dispatch(&mut session, Command::Join(joiner.clone()), None).changed);

        let matching = session.players.iter().filter(|p| p.id == joiner.id).count();
        assert_eq!(matching, 1);
    }

    #[test]
    fn start_requires_host_sender() {
        let (mut session, _) = lobby();
        let joiner = Player::new("Rossi", Role::Guard);
        let joiner_id = joiner.id;
        dispatch(&mut session, Command::Join(joiner), None);
        dispatch(
            &mut session,
            Command::Join(Player::new("Dubois", Role::Guard)),
            None,
        );

        assert!(!dispatch(&mut session, Command::StartGame, Some(joiner_id)).changed);
        assert!(!dispatch(&mut session, Command::StartGame, None).changed);
        assert_eq!(session.phase, GamePhase::Lobby);
    }

    #[test]
    fn start_refused_below_minimum() {
        let (mut session, host_id) = lobby();
        dispatch(
            &mut session,
            Command::Join(Player::new("Rossi", Role::Guard)),
            None,
        );

        assert!(!dispatch(&mut session, Command::StartGame, Some(host_id)).changed);
        assert_eq!(session.phase, GamePhase::Lobby);
    }

    #[test]
    fn start_assigns_roles_and_activates() {
        let (session, _) = started(2);

        assert_eq!(session.phase, GamePhase::Active);
        let infiltrated = session
            .players
            .iter()
            .filter(|p| p.role == Role::Infiltrated)
            .count();
        let intel = session
            .players
            .iter()
            .filter(|p| p.role == Role::IntelOfficer)
            .count();
        assert_eq!(infiltrated, 1);
        assert_eq!(intel, 1);
    }

    #[test]
    fn sabotage_start_only_from_idle() {
        let (mut session, _) = started(2);
        let infiltrated = player_with_role(&session, Role::Infiltrated);

        let out = dispatch(&mut session, Command::SabotageStart, Some(infiltrated));
        assert!(out.changed);
        assert_eq!(session.sabotage.phase, SabotagePhase::Pending);
        assert_eq!(
            session.alert_msg.as_deref(),
            Some(ALERT_SABOTAGE_STARTED)
        );

        // Already pending: no-op, no second broadcast.
        assert!(!dispatch(&mut session, Command::SabotageStart, Some(infiltrated)).changed);
    }

    #[test]
    fn report_defeats_and_schedules_alert_clear() {
        let (mut session, _) = started(3);
        let infiltrated = player_with_role(&session, Role::Infiltrated);
        let guard = player_with_role(&session, Role::Guard);

        dispatch(&mut session, Command::SabotageStart, Some(infiltrated));
        let out = dispatch(&mut session, Command::SabotageReport, Some(guard));

        assert!(out.changed);
        assert!(out.schedule_alert_clear);
        assert!(!session.sabotage.active);
        assert_eq!(session.sabotage.phase, SabotagePhase::Defeated);
        assert_eq!(
            session.alert_msg.as_deref(),
            Some(ALERT_SABOTAGE_DEFEATED)
        );
    }

    #[test]
    fn report_rejected_from_host_and_infiltrator() {
        let (mut session, host_id) = started(3);
        let infiltrated = player_with_role(&session, Role::Infiltrated);

        dispatch(&mut session, Command::SabotageStart, Some(infiltrated));

        assert!(!dispatch(&mut session, Command::SabotageReport, Some(host_id)).changed);
        assert!(!dispatch(&mut session, Command::SabotageReport, Some(infiltrated)).changed);
        assert_eq!(session.sabotage.phase, SabotagePhase::Pending);
    }

    #[test]
    fn report_without_active_sabotage_is_noop() {
        let (mut session, _) = started(2);
        let guard = player_with_role(&session, Role::IntelOfficer);

        let out = dispatch(&mut session, Command::SabotageReport, Some(guard));
        assert!(!out.changed);
        assert_eq!(session.sabotage.phase, SabotagePhase::Idle);
        assert!(session.alert_msg.is_none());
    }

    #[test]
    fn complete_stores_proof_reference() {
        let (mut session, _) = started(2);
        let infiltrated = player_with_role(&session, Role::Infiltrated);

        dispatch(&mut session, Command::SabotageStart, Some(infiltrated));
        let out = dispatch(
            &mut session,
            Command::SabotageComplete("img://seal-7".into()),
            Some(infiltrated),
        );

        assert!(out.changed);
        assert_eq!(session.sabotage.phase, SabotagePhase::Completed);
        assert_eq!(session.sabotage.proof_ref.as_deref(), Some("img://seal-7"));
    }

    #[test]
    fn bip_toggles_between_active_and_alarm() {
        let (mut session, host_id) = started(2);
        let guard = player_with_role(&session, Role::IntelOfficer);

        // Any player may trigger.
        assert!(dispatch(&mut session, Command::BipTrigger, Some(guard)).changed);
        assert_eq!(session.phase, GamePhase::Alarm);

        // Trigger while already alarmed: no-op.
        assert!(!dispatch(&mut session, Command::BipTrigger, Some(guard)).changed);

        // Release is owner-restricted.
        assert!(!dispatch(&mut session, Command::BipRelease, Some(guard)).changed);
        assert_eq!(session.phase, GamePhase::Alarm);

        session.alert_msg = Some("drill".into());
        assert!(dispatch(&mut session, Command::BipRelease, Some(host_id)).changed);
        assert_eq!(session.phase, GamePhase::Active);
        assert!(session.alert_msg.is_none());
    }

    #[test]
    fn bip_trigger_is_noop_in_lobby() {
        let (mut session, host_id) = lobby();
        assert!(!dispatch(&mut session, Command::BipTrigger, Some(host_id)).changed);
        assert_eq!(session.phase, GamePhase::Lobby);
    }

    #[test]
    fn codis_use_consumes_once() {
        let (mut session, _) = started(2);
        let intel = player_with_role(&session, Role::IntelOfficer);

        assert!(dispatch(&mut session, Command::CodisUse, Some(intel)).changed);
        assert!(session.intel_check_used);

        // Second use: consumed exactly once, no further broadcast.
        assert!(!dispatch(&mut session, Command::CodisUse, Some(intel)).changed);
        assert!(session.intel_check_used);
    }

    #[test]
    fn sync_session_is_not_a_command() {
        let (session, _) = lobby();
        assert!(Command::from_wire(Message::SyncSession(Box::new(session))).is_none());
    }
}
