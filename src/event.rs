//! Events emitted to the embedding presentation layer.

use crate::protocol::{GameSession, PlayerId};

/// Something the UI layer should react to.
///
/// Both the host and client loops emit these on a bounded channel; when
/// the consumer cannot keep up, intermediate events may be dropped (a
/// later `SessionUpdated` always carries the full current state, so
/// nothing is lost permanently). `Disconnected` is always delivered.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The loop is running and the channel is live.
    Connected,
    /// A fresh full snapshot of the session. Replaces anything shown so
    /// far; snapshots are never partial.
    SessionUpdated(Box<GameSession>),
    /// Host side only: a peer's JOIN was accepted.
    PeerJoined { player_id: PlayerId, name: String },
    /// Host side only: a peer's channel closed.
    PeerLeft { player_id: PlayerId },
    /// The loop has stopped. Always the final event.
    Disconnected { reason: Option<String> },
}
