//! Sabotage sub-state-machine.
//!
//! Tracked inside [`GameSession`](crate::protocol::GameSession) and
//! synchronized to every terminal, so each one computes identical
//! remaining time from the shared `started_at_ms` timestamp rather than
//! a local counter.
//!
//! ```text
//! IDLE ─start→ PENDING ─timer elapsed→ READY_FOR_UPLOAD ─complete→ COMPLETED
//!                 │
//!                 └─report→ DEFEATED (IDLE again once a new start is accepted)
//! ```
//!
//! The intermediate `TRANSMITTING`/`VERIFYING` phases are cosmetic
//! staging for the upload feedback; the dispatcher jumps straight to
//! `COMPLETED` and leaves the staging to presentation-layer timers.

use serde::{Deserialize, Serialize};

use crate::protocol::PlayerId;

/// Phase of the sabotage sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SabotagePhase {
    #[default]
    Idle,
    /// Countdown running from `started_at_ms`.
    Pending,
    /// Countdown elapsed; waiting for the proof upload.
    ReadyForUpload,
    /// Upload feedback staging (presentation-timed).
    Transmitting,
    /// Upload feedback staging (presentation-timed).
    Verifying,
    Completed,
    /// Reported by a guard before completion.
    Defeated,
}

/// Synchronized state of the sabotage sequence.
///
/// Invariants: `Pending` implies `active` and a set `started_at_ms`;
/// `Completed` and `Defeated` imply `!active`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SabotageState {
    pub active: bool,
    /// Wall-clock start, milliseconds since the Unix epoch. Carried in
    /// every snapshot so late joiners see the same deadline.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at_ms: Option<u64>,
    /// Reserved target identifier; stored but unused by the core.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_id: Option<PlayerId>,
    pub phase: SabotagePhase,
    /// Reference to the proof image attached on completion.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub proof_ref: Option<String>,
}

impl SabotageState {
    /// Start the countdown. Only meaningful from `Idle` or `Defeated`;
    /// returns `false` (no change) otherwise.
    pub fn start(&mut self, now_ms: u64) -> bool {
        match self.phase {
            SabotagePhase::Idle | SabotagePhase::Defeated => {
                self.active = true;
                self.started_at_ms = Some(now_ms);
                self.phase = SabotagePhase::Pending;
                self.proof_ref = None;
                true
            }
            _ => false,
        }
    }

    /// Cross into `ReadyForUpload` once `duration_ms` has elapsed since
    /// the stored start. Idempotent past the threshold: the first call
    /// that crosses it returns `true`, later calls `false`.
    pub fn tick(&mut self, now_ms: u64, duration_ms: u64) -> bool {
        if self.phase != SabotagePhase::Pending {
            return false;
        }
        let Some(started) = self.started_at_ms else {
            return false;
        };
        if now_ms.saturating_sub(started) >= duration_ms {
            self.phase = SabotagePhase::ReadyForUpload;
            true
        } else {
            false
        }
    }

    /// Defeat the sabotage. Only meaningful while it is active.
    pub fn report(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.phase = SabotagePhase::Defeated;
        true
    }

    /// Complete the sabotage, attaching the proof reference.
    pub fn complete(&mut self, proof_ref: impl Into<String>) -> bool {
        if matches!(
            self.phase,
            SabotagePhase::Completed | SabotagePhase::Defeated | SabotagePhase::Idle
        ) {
            return false;
        }
        self.active = false;
        self.phase = SabotagePhase::Completed;
        self.proof_ref = Some(proof_ref.into());
        true
    }

    /// Milliseconds left on the countdown, `None` outside `Pending`.
    pub fn remaining_ms(&self, now_ms: u64, duration_ms: u64) -> Option<u64> {
        if self.phase != SabotagePhase::Pending {
            return None;
        }
        let started = self.started_at_ms?;
        Some(duration_ms.saturating_sub(now_ms.saturating_sub(started)))
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

    const TEN_MIN: u64 = 10 * 60 * 1000;

    #[test]
    fn start_sets_pending_and_timestamp() {
        let mut s = SabotageState::default();
        assert!(s.start(1_000));
        assert!(s.active);
        assert_eq!(s.phase, SabotagePhase::Pending);
        assert_eq!(s.started_at_ms, Some(1_000));
    }

    #[test]
    fn start_is_noop_while_pending() {
        let mut s = SabotageState::default();
        s.start(1_000);
        assert!(!s.start(2_000));
        assert_eq!(s.started_at_ms, Some(1_000));
    }

    #[test]
    fn restart_allowed_after_defeat() {
        let mut s = SabotageState::default();
        s.start(1_000);
        s.report();
        assert_eq!(s.phase, SabotagePhase::Defeated);
        assert!(s.start(5_000));
        assert_eq!(s.phase, SabotagePhase::Pending);
        assert_eq!(s.started_at_ms, Some(5_000));
    }

    #[test]
    fn tick_crosses_threshold_exactly_once() {
        let mut s = SabotageState::default();
        s.start(0);

        assert!(!s.tick(TEN_MIN - 1, TEN_MIN));
        assert_eq!(s.phase, SabotagePhase::Pending);

        assert!(s.tick(TEN_MIN, TEN_MIN));
        assert_eq!(s.phase, SabotagePhase::ReadyForUpload);

        // Idempotent past the threshold.
        assert!(!s.tick(TEN_MIN + 60_000, TEN_MIN));
        assert_eq!(s.phase, SabotagePhase::ReadyForUpload);
    }

    #[test]
    fn report_only_while_active() {
        let mut s = SabotageState::default();
        assert!(!s.report());

        s.start(0);
        assert!(s.report());
        assert!(!s.active);
        assert_eq!(s.phase, SabotagePhase::Defeated);

        // A second report is a no-op on the same end state.
        assert!(!s.report());
        assert_eq!(s.phase, SabotagePhase::Defeated);
    }

    #[test]
    fn complete_attaches_proof_and_deactivates() {
        let mut s = SabotageState::default();
        s.start(0);
        s.tick(TEN_MIN, TEN_MIN);

        assert!(s.complete("photo-42"));
        assert_eq!(s.phase, SabotagePhase::Completed);
        assert!(!s.active);
        assert_eq!(s.proof_ref.as_deref(), Some("photo-42"));

        assert!(!s.complete("photo-43"));
        assert_eq!(s.proof_ref.as_deref(), Some("photo-42"));
    }

    #[test]
    fn complete_rejected_from_idle_and_defeated() {
        let mut s = SabotageState::default();
        assert!(!s.complete("x"));

        s.start(0);
        s.report();
        assert!(!s.complete("x"));
        assert_eq!(s.phase, SabotagePhase::Defeated);
    }

    #[test]
    fn remaining_time_is_computed_from_shared_timestamp() {
        let mut s = SabotageState::default();
        s.start(10_000);
        assert_eq!(s.remaining_ms(10_000, TEN_MIN), Some(TEN_MIN));
        assert_eq!(s.remaining_ms(70_000, TEN_MIN), Some(TEN_MIN - 60_000));
        // Clamped at zero once elapsed.
        assert_eq!(s.remaining_ms(10_000 + TEN_MIN + 5, TEN_MIN), Some(0));

        s.tick(10_000 + TEN_MIN, TEN_MIN);
        assert_eq!(s.remaining_ms(0, TEN_MIN), None);
    }
}
