//! Shared types and constants for the Parley platform.
//!
//! This crate provides the foundational types used across all Parley crates.
//! No crate in the workspace depends on anything *except* `parley-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};

/// Sample rate the recognizer expects for inbound 16-bit PCM audio.
pub const PCM_SAMPLE_RATE_HZ: u32 = 16_000;

/// Conversation state of one live session.
///
/// The wire representation matches the client protocol: `"IDLE"`,
/// `"LISTENING"`, `"THINKING"`, `"SPEAKING"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    /// Pre-connection default. A live session leaves this state immediately.
    Idle,
    /// Waiting for the user to finish an utterance.
    Listening,
    /// Reserved for an explicit "generating, not yet speaking" phase.
    /// Declared for protocol completeness; no transition reaches it today.
    Thinking,
    /// The agent's reply is being synthesized and streamed to the client.
    Speaking,
}

impl AgentState {
    /// Returns the string label for this state, as sent on the wire.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Listening => "LISTENING",
            Self::Thinking => "THINKING",
            Self::Speaking => "SPEAKING",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_to_wire_labels() {
        for state in [
            AgentState::Idle,
            AgentState::Listening,
            AgentState::Thinking,
            AgentState::Speaking,
        ] {
            let json = serde_json::to_value(state).expect("serialize");
            assert_eq!(json, serde_json::Value::String(state.label().to_string()));
        }
    }

    #[test]
    fn state_round_trips() {
        let state: AgentState = serde_json::from_str("\"SPEAKING\"").expect("deserialize");
        assert_eq!(state, AgentState::Speaking);
    }
}
