//! The per-connection turn orchestrator for the Parley platform.
//!
//! A conversation is a sequence of turns: the user speaks, a quiet interval
//! commits the utterance, the agent replies through the synthesizer while the
//! recognizer keeps listening for barge-in, and the turn completes once both
//! the text generation and the synthesis have finished. This crate owns that
//! life cycle — the session state machine, the token buffer between generator
//! and synthesizer, the silence and flush timers, the interruption
//! classifier, and the completion gate — independent of any transport or
//! vendor client.

pub mod buffer;
pub mod classify;
pub mod config;
pub mod session;
pub mod state;
pub mod turn;

pub use buffer::TokenBuffer;
pub use classify::is_meaningful_interruption;
pub use config::TurnConfig;
pub use session::{Session, SessionEvent, SessionHandle, SessionOutput};
pub use state::SessionState;
pub use turn::{Turn, TurnFlags};
