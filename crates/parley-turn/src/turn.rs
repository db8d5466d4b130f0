//! Per-turn state: completion flags and the generation cancellation handle.

use tokio_util::sync::CancellationToken;

/// Join state for the two producers whose completion ends a turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct TurnFlags {
    /// The generation stream delivered its terminal event.
    pub generation_done: bool,
    /// The synthesizer finished rendering all queued input.
    pub synthesis_done: bool,
    /// At least one audio frame went out to the client this turn.
    pub first_audio_sent: bool,
}

/// State of one agent turn.
///
/// The orchestrator replaces the whole value at turn start, so a new turn can
/// never observe a prior turn's flags or buffered text. Collaborator events
/// are tagged with `id` so stragglers from a superseded turn are recognized
/// and dropped.
#[derive(Debug)]
pub struct Turn {
    pub id: u64,
    pub flags: TurnFlags,
    /// Cancels the generation stream when the turn is torn down.
    pub cancel: CancellationToken,
    /// Set once the completion gate has passed, making re-evaluation a no-op
    /// while the settle delay runs.
    pub completing: bool,
}

impl Turn {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            flags: TurnFlags::default(),
            cancel: CancellationToken::new(),
            completing: false,
        }
    }

    /// The completion gate: both producers finished and the gate has not
    /// already passed.
    pub fn is_complete(&self) -> bool {
        self.flags.generation_done && self.flags.synthesis_done && !self.completing
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        // Replacing or discarding a turn always stops its generation stream.
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_requires_both_producers() {
        let mut turn = Turn::new(1);
        assert!(!turn.is_complete());

        turn.flags.generation_done = true;
        assert!(!turn.is_complete());

        turn.flags.synthesis_done = true;
        assert!(turn.is_complete());
    }

    #[test]
    fn gate_passes_once() {
        let mut turn = Turn::new(1);
        turn.flags.generation_done = true;
        turn.flags.synthesis_done = true;
        assert!(turn.is_complete());

        turn.completing = true;
        assert!(!turn.is_complete());
    }

    #[test]
    fn dropping_a_turn_cancels_generation() {
        let turn = Turn::new(1);
        let cancel = turn.cancel.clone();
        drop(turn);
        assert!(cancel.is_cancelled());
    }
}
