//! Collaborator contracts and streaming clients for the Parley platform.
//!
//! The turn orchestrator never talks to a vendor directly: it consumes the
//! [`Recognizer`], [`Generator`], and [`Synthesizer`] contracts defined here,
//! with results delivered over channels so every session keeps a single
//! logical thread of control. The clients in [`stt`], [`llm`], and [`tts`]
//! are the production implementations — streaming WebSocket connections for
//! speech in both directions and a streaming HTTP connection for text
//! generation.

pub mod config;
pub mod error;
pub mod llm;
pub mod stt;
pub mod tts;

pub use config::{GeneratorConfig, RecognizerConfig, SynthesizerConfig};
pub use error::VoiceError;
pub use llm::{GenerationEvent, Generator, HttpGenerator};
pub use stt::{Recognizer, RecognizerEvent, RecognizerFactory, WsRecognizerFactory};
pub use tts::{SynthesisEvent, Synthesizer, SynthesizerFactory, WsSynthesizerFactory};
