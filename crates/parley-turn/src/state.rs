//! Conversation state holder.

use parley_types::AgentState;
use tracing::debug;

/// Holds the conversation state of one session.
///
/// All mutation happens on the session's event loop, so no synchronization is
/// needed — but state captured when a timer was armed must be re-checked at
/// fire time, because the session may have moved on since.
#[derive(Debug)]
pub struct SessionState {
    current: AgentState,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            current: AgentState::Idle,
        }
    }

    /// Unconditionally overwrites the state.
    pub fn set(&mut self, next: AgentState) {
        debug!(from = self.current.label(), to = next.label(), "session state change");
        self.current = next;
    }

    /// Snapshot of the current state.
    pub fn get(&self) -> AgentState {
        self.current
    }

    /// Snapshot comparison against an expected state.
    pub fn is(&self, expected: AgentState) -> bool {
        self.current == expected
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_and_overwrites_unconditionally() {
        let mut state = SessionState::new();
        assert!(state.is(AgentState::Idle));

        state.set(AgentState::Listening);
        assert!(state.is(AgentState::Listening));

        state.set(AgentState::Speaking);
        state.set(AgentState::Listening);
        assert_eq!(state.get(), AgentState::Listening);
    }
}
