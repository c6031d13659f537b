//! External flavor-text collaborator.
//!
//! An implementation generates short operational flavor copy for
//! briefings and intel reports (typically an LLM call). The
//! collaborator is allowed to fail or hang on its own time; the helpers
//! below recover every failure with a fixed fallback string so narration
//! can never block or break the state machine. The only state machine
//! interaction is elsewhere: marking the intel check consumed, which goes
//! through the host dispatcher like any other command.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::Role;

/// Fallback briefing text when the collaborator fails.
pub const FALLBACK_BRIEFING: &str = "Secure channel established. Awaiting orders.";
/// Fallback intel report when the collaborator fails.
pub const FALLBACK_INTEL: &str = "CODIS archive access restricted.";

/// Asynchronous flavor-text generator.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Short mission briefing for `name`, coloured by their secret role.
    async fn briefing(&self, role: Role, name: &str) -> Result<String>;

    /// Cryptic intel report for `observer` investigating `target`. Hints
    /// at allegiance without revealing the role outright.
    async fn intel(&self, observer: &str, target: &str) -> Result<String>;
}

/// Run a briefing request, recovering any failure with the fixed
/// fallback string.
pub async fn briefing_or_fallback<N: Narrator + ?Sized>(
    narrator: &N,
    role: Role,
    name: &str,
) -> String {
    match narrator.briefing(role, name).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("briefing generation failed: {e}");
            FALLBACK_BRIEFING.to_string()
        }
    }
}

/// Run an intel request, recovering any failure with the fixed fallback
/// string.
pub async fn intel_or_fallback<N: Narrator + ?Sized>(
    narrator: &N,
    observer: &str,
    target: &str,
) -> String {
    match narrator.intel(observer, target).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("intel generation failed: {e}");
            FALLBACK_INTEL.to_string()
        }
    }
}

/// Canned narrator for tests, demos, and offline play.
#[derive(Debug, Clone, Default)]
pub struct StaticNarrator;

#[async_trait]
impl Narrator for StaticNarrator {
    async fn briefing(&self, role: Role, name: &str) -> Result<String> {
        let line = match role {
            Role::Host => "You run the watch. Keep the crew moving and the seal guarded.",
            Role::Guard => "Stand your watch. Report anything near the seal.",
            Role::Infiltrated => "You are not who they think. The seal must not survive the night.",
            Role::IntelOfficer => "One archive pull. Spend it on the right person.",
        };
        Ok(format!("{name} — {line}"))
    }

    async fn intel(&self, observer: &str, target: &str) -> Result<String> {
        Ok(format!(
            "{observer}: movement logs for {target} show gaps around the seal rounds. \
             Draw your own conclusions."
        ))
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
    use crate::error::SessionError;

    /// Narrator that always fails, to exercise the fallback path.
    struct BrokenNarrator;

    #[async_trait]
    impl Narrator for BrokenNarrator {
        async fn briefing(&self, _role: Role, _name: &str) -> Result<String> {
            Err(SessionError::Narrator("model unavailable".into()))
        }

        async fn intel(&self, _observer: &str, _target: &str) -> Result<String> {
            Err(SessionError::Narrator("model unavailable".into()))
        }
    }

    #[tokio::test]
    async fn failure_recovers_with_fixed_fallbacks() {
        let text = briefing_or_fallback(&BrokenNarrator, Role::Guard, "Rossi").await;
        assert_eq!(text, FALLBACK_BRIEFING);

        let text = intel_or_fallback(&BrokenNarrator, "Ltn. Codis", "Rossi").await;
        assert_eq!(text, FALLBACK_INTEL);
    }

    #[tokio::test]
    async fn static_narrator_mentions_the_player() {
        let text = briefing_or_fallback(&StaticNarrator, Role::Infiltrated, "Sgt. Marchand").await;
        assert!(text.contains("Sgt. Marchand"));
    }
}
