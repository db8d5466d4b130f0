//! The per-connection turn orchestrator.
//!
//! One session task owns every piece of mutable per-connection state. All
//! collaborator results, timer fires, and client control messages are posted
//! to the session's event channel and handled strictly in arrival order, so
//! no two handlers for the same session ever run concurrently and no field
//! needs a lock. Timers are spawned sleeps that post an epoch-tagged event
//! back to the same channel; arming a new timer aborts the old task *and*
//! bumps the epoch, so a stale fire already sitting in the queue is
//! recognized and ignored.

use crate::buffer::{PushOutcome, TokenBuffer};
use crate::classify::is_meaningful_interruption;
use crate::config::TurnConfig;
use crate::state::SessionState;
use crate::turn::Turn;
use parley_types::AgentState;
use parley_voice::{GenerationEvent, Generator, SynthesisEvent, Synthesizer, SynthesizerFactory, VoiceError};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the outbound channel toward the transport.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Stock phrases spoken the moment a turn starts, masking generation latency.
const FILLER_PHRASES: &[&str] = &[
    "Hmm, let me think.",
    "One moment.",
    "Good question.",
    "Let's see.",
];

/// Everything a session reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    /// Interim transcript from the recognizer.
    Partial(String),
    /// Stable transcript for an utterance segment.
    Final(String),
    /// Explicit request from the client to stop the agent mid-reply.
    ClientInterrupt,
    /// The quiet interval elapsed with no new recognizer activity.
    SilenceElapsed { epoch: u64 },
    /// The token-buffer debounce elapsed.
    FlushElapsed { epoch: u64 },
    /// One generation token.
    Token { turn: u64, text: String },
    /// The generation stream completed.
    GenerationDone { turn: u64 },
    /// The generation stream failed.
    GenerationFailed { turn: u64, reason: String },
    /// Synthesized audio ready for the client.
    SynthAudio { turn: u64, bytes: Vec<u8> },
    /// The synthesizer produced the first audio of a queued unit.
    SynthChunkComplete { turn: u64 },
    /// The synthesizer finished rendering all queued input.
    SynthFinished { turn: u64 },
    /// No synthesis-finished signal arrived in time after generation ended.
    SynthesisFallbackElapsed { turn: u64 },
    /// The settle delay after turn completion elapsed.
    SettleElapsed { turn: u64 },
    /// The transport is closing the connection.
    Shutdown,
}

/// Everything a session emits toward the client, transport-agnostic. The
/// transport layer serializes these onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    State(AgentState),
    PartialTranscript(String),
    AgentAudio(Vec<u8>),
}

/// Handle to a spawned session.
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Posting endpoint for recognizer forwarders and the transport.
    pub fn events(&self) -> mpsc::Sender<SessionEvent> {
        self.events.clone()
    }

    /// Tears the session down: cancels outstanding timers and releases the
    /// active synthesis stream, then waits for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.events.send(SessionEvent::Shutdown).await;
        let _ = self.task.await;
    }
}

/// The orchestrator: per-connection state machine driving the turn life
/// cycle end to end.
pub struct Session {
    config: TurnConfig,
    state: SessionState,
    /// Committed user utterance awaiting turn start.
    pending_transcript: Option<String>,
    buffer: TokenBuffer,
    /// The active turn, replaced wholesale at turn start.
    turn: Option<Turn>,
    /// Live synthesis stream. Non-absent only while `Speaking`.
    synthesis: Option<Box<dyn Synthesizer>>,
    speaking_since: Option<Instant>,
    next_turn_id: u64,

    silence_epoch: u64,
    silence_timer: Option<JoinHandle<()>>,
    flush_epoch: u64,
    flush_timer: Option<JoinHandle<()>>,

    synthesizer_factory: Arc<dyn SynthesizerFactory>,
    generator: Arc<dyn Generator>,

    events_tx: mpsc::Sender<SessionEvent>,
    outbound: mpsc::Sender<SessionOutput>,
}

impl Session {
    /// Spawns a session task for one connection.
    ///
    /// The returned receiver carries everything the transport should deliver
    /// to the client, starting with the initial `LISTENING` notification.
    pub fn spawn(
        config: TurnConfig,
        synthesizer_factory: Arc<dyn SynthesizerFactory>,
        generator: Arc<dyn Generator>,
    ) -> (SessionHandle, mpsc::Receiver<SessionOutput>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

        let flush_threshold = config.flush_threshold_chars;
        let mut session = Session {
            config,
            state: SessionState::new(),
            pending_transcript: None,
            buffer: TokenBuffer::new(flush_threshold),
            turn: None,
            synthesis: None,
            speaking_since: None,
            next_turn_id: 0,
            silence_epoch: 0,
            silence_timer: None,
            flush_epoch: 0,
            flush_timer: None,
            synthesizer_factory,
            generator,
            events_tx: events_tx.clone(),
            outbound: outbound_tx,
        };

        let task = tokio::spawn(async move {
            session.state.set(AgentState::Listening);
            session.emit(SessionOutput::State(AgentState::Listening));
            session.run(events_rx).await;
        });

        (
            SessionHandle {
                events: events_tx,
                task,
            },
            outbound_rx,
        )
    }

    async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if let SessionEvent::Shutdown = event {
                break;
            }
            self.handle(event);
        }
        self.teardown();
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Partial(text) => self.on_partial(text),
            SessionEvent::Final(text) => self.on_final(text),
            SessionEvent::ClientInterrupt => self.on_client_interrupt(),
            SessionEvent::SilenceElapsed { epoch } => self.on_silence_elapsed(epoch),
            SessionEvent::FlushElapsed { epoch } => self.on_flush_elapsed(epoch),
            SessionEvent::Token { turn, text } => self.on_token(turn, text),
            SessionEvent::GenerationDone { turn } => self.on_generation_done(turn),
            SessionEvent::GenerationFailed { turn, reason } => {
                self.on_generation_failed(turn, reason)
            }
            SessionEvent::SynthAudio { turn, bytes } => self.on_synth_audio(turn, bytes),
            SessionEvent::SynthChunkComplete { turn } => self.on_synth_chunk_complete(turn),
            SessionEvent::SynthFinished { turn } => self.on_synth_finished(turn),
            SessionEvent::SynthesisFallbackElapsed { turn } => self.on_synthesis_fallback(turn),
            SessionEvent::SettleElapsed { turn } => self.on_settle_elapsed(turn),
            SessionEvent::Shutdown => {} // handled by the run loop
        }
    }

    fn on_partial(&mut self, text: String) {
        if self.state.is(AgentState::Listening) {
            self.emit(SessionOutput::PartialTranscript(text));
            self.arm_silence_timer();
        }
        // Partials during agent speech carry no commitment; only finals can
        // barge in.
    }

    fn on_final(&mut self, text: String) {
        match self.state.get() {
            AgentState::Listening => {
                debug!(transcript = %text, "utterance settled; awaiting quiet interval");
                self.pending_transcript = Some(text);
                self.arm_silence_timer();
            }
            AgentState::Speaking => self.on_final_while_speaking(text),
            _ => {}
        }
    }

    fn on_final_while_speaking(&mut self, text: String) {
        if !is_meaningful_interruption(&text) {
            debug!(transcript = %text, "backchannel during agent speech; ignoring");
            return;
        }
        info!(transcript = %text, "user barge-in; aborting turn");
        self.abort_turn();
        // The interrupting utterance becomes the next pending transcript and
        // goes through the normal quiet-interval commit.
        self.pending_transcript = Some(text);
        self.state.set(AgentState::Listening);
        self.emit(SessionOutput::State(AgentState::Listening));
        self.arm_silence_timer();
    }

    fn on_client_interrupt(&mut self) {
        if !self.state.is(AgentState::Speaking) {
            return;
        }
        info!("client interrupt; aborting turn");
        self.abort_turn();
        self.state.set(AgentState::Listening);
        self.emit(SessionOutput::State(AgentState::Listening));
    }

    /// Synchronously releases everything the active turn owns, before control
    /// returns to the event loop. Events already in flight for the old turn
    /// are dropped afterwards by the turn-id and handle-presence guards.
    fn abort_turn(&mut self) {
        if let Some(synthesis) = self.synthesis.take() {
            synthesis.close();
        }
        self.turn = None; // Turn::drop cancels the generation stream
        self.buffer.clear();
        self.disarm_flush_timer();
        self.speaking_since = None;
    }

    /// Starts the quiet-interval countdown, superseding any prior one.
    fn arm_silence_timer(&mut self) {
        self.silence_epoch += 1;
        if let Some(timer) = self.silence_timer.take() {
            timer.abort();
        }
        let epoch = self.silence_epoch;
        let quiet = self.config.quiet_interval();
        let events = self.events_tx.clone();
        self.silence_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = events.send(SessionEvent::SilenceElapsed { epoch }).await;
        }));
    }

    fn on_silence_elapsed(&mut self, epoch: u64) {
        if epoch != self.silence_epoch {
            return; // superseded while the fire was in flight
        }
        self.silence_timer = None;
        if !self.state.is(AgentState::Listening) {
            return;
        }
        let Some(transcript) = self.pending_transcript.take() else {
            return; // quiet interval passed with nothing settled
        };
        info!(transcript = %transcript, "utterance committed; starting turn");
        self.state.set(AgentState::Speaking);
        self.speaking_since = Some(Instant::now());
        self.emit(SessionOutput::State(AgentState::Speaking));
        if let Err(error) = self.start_turn(&transcript) {
            // A failed start must never strand the session in SPEAKING.
            warn!(%error, "turn start failed; recovering to listening");
            self.abort_turn();
            self.state.set(AgentState::Listening);
            self.emit(SessionOutput::State(AgentState::Listening));
        }
    }

    fn start_turn(&mut self, transcript: &str) -> Result<(), VoiceError> {
        self.next_turn_id += 1;
        let turn_id = self.next_turn_id;
        self.buffer.clear();
        let turn = Turn::new(turn_id);

        let (synthesis, synthesis_events) = self.synthesizer_factory.open()?;
        self.forward_synthesis_events(turn_id, synthesis_events);

        // The filler goes out before generation starts, so the synthesizer
        // renders it first and the user hears something while the model
        // warms up.
        let filler = FILLER_PHRASES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("One moment.");
        synthesis.send_text(filler);

        let tokens = self.generator.start(transcript, turn.cancel.clone());
        self.forward_generation_events(turn_id, tokens);

        self.synthesis = Some(synthesis);
        self.turn = Some(turn);
        Ok(())
    }

    fn forward_synthesis_events(&self, turn: u64, mut source: mpsc::Receiver<SynthesisEvent>) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = source.recv().await {
                let mapped = match event {
                    SynthesisEvent::Audio(bytes) => SessionEvent::SynthAudio { turn, bytes },
                    SynthesisEvent::ChunkComplete => SessionEvent::SynthChunkComplete { turn },
                    SynthesisEvent::Finished => SessionEvent::SynthFinished { turn },
                };
                if events.send(mapped).await.is_err() {
                    break;
                }
            }
        });
    }

    fn forward_generation_events(&self, turn: u64, mut source: mpsc::Receiver<GenerationEvent>) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = source.recv().await {
                let mapped = match event {
                    GenerationEvent::Token(text) => SessionEvent::Token { turn, text },
                    GenerationEvent::Done => SessionEvent::GenerationDone { turn },
                    GenerationEvent::Failed(reason) => {
                        SessionEvent::GenerationFailed { turn, reason }
                    }
                };
                if events.send(mapped).await.is_err() {
                    break;
                }
            }
        });
    }

    /// True when `turn` is the live turn and the session still owns a
    /// synthesis stream — the guard every token and audio event passes.
    fn turn_is_live(&self, turn: u64) -> bool {
        self.state.is(AgentState::Speaking)
            && self.synthesis.is_some()
            && self.turn.as_ref().is_some_and(|t| t.id == turn)
    }

    /// True when `turn` is the current turn value, live or settling.
    fn turn_is_current(&self, turn: u64) -> bool {
        self.turn.as_ref().is_some_and(|t| t.id == turn)
    }

    fn on_token(&mut self, turn: u64, text: String) {
        if !self.turn_is_live(turn) {
            warn!(turn, "token for a torn-down turn; dropping");
            return;
        }
        match self.buffer.push(&text) {
            PushOutcome::FlushNow => {
                self.disarm_flush_timer();
                self.flush();
            }
            PushOutcome::Debounce => self.arm_flush_timer(),
        }
    }

    fn on_generation_done(&mut self, turn: u64) {
        if !self.turn_is_current(turn) {
            debug!(turn, "generation finished for a torn-down turn; ignoring");
            return;
        }
        debug!(turn, "generation stream complete");
        // Trailing text must never be dropped: flush whatever is left, then
        // tell the synthesizer no more input is coming.
        self.disarm_flush_timer();
        self.flush();
        if let Some(synthesis) = self.synthesis.as_ref() {
            synthesis.send_text("");
        }
        if let Some(t) = self.turn.as_mut() {
            t.flags.generation_done = true;
        }
        self.arm_synthesis_fallback(turn);
        self.check_turn_complete();
    }

    fn on_generation_failed(&mut self, turn: u64, reason: String) {
        if !self.turn_is_current(turn) {
            return;
        }
        // A failed stream is terminal just like a completed one; the turn
        // finishes with whatever was already spoken.
        warn!(turn, %reason, "generation stream failed; completing turn early");
        self.on_generation_done(turn);
    }

    fn arm_flush_timer(&mut self) {
        self.flush_epoch += 1;
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
        let epoch = self.flush_epoch;
        let debounce = self.config.flush_debounce();
        let events = self.events_tx.clone();
        self.flush_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let _ = events.send(SessionEvent::FlushElapsed { epoch }).await;
        }));
    }

    fn disarm_flush_timer(&mut self) {
        self.flush_epoch += 1;
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
    }

    fn on_flush_elapsed(&mut self, epoch: u64) {
        if epoch != self.flush_epoch {
            return;
        }
        self.flush_timer = None;
        self.flush();
    }

    /// Hands the whole buffer to the synthesizer as one unit. A no-op when
    /// the buffer is empty; buffered text left over after a teardown is
    /// discarded with a warning rather than spoken into a dead stream.
    fn flush(&mut self) {
        let Some(chunk) = self.buffer.take() else {
            return;
        };
        if !self.state.is(AgentState::Speaking) {
            warn!(chars = chunk.len(), "flush after turn teardown; dropping");
            return;
        }
        let Some(synthesis) = self.synthesis.as_ref() else {
            warn!(chars = chunk.len(), "flush with no synthesis stream; dropping");
            return;
        };
        synthesis.send_text(&chunk);
    }

    fn on_synth_audio(&mut self, turn: u64, bytes: Vec<u8>) {
        if !self.turn_is_live(turn) {
            debug!(turn, bytes = bytes.len(), "audio for a torn-down turn; dropping");
            return;
        }
        if let Some(t) = self.turn.as_mut() {
            if !t.flags.first_audio_sent {
                t.flags.first_audio_sent = true;
                if let Some(since) = self.speaking_since {
                    debug!(
                        elapsed_ms = since.elapsed().as_millis() as u64,
                        "first audio heading to the client"
                    );
                }
            }
        }
        self.emit(SessionOutput::AgentAudio(bytes));
    }

    fn on_synth_chunk_complete(&mut self, turn: u64) {
        if !self.turn_is_current(turn) {
            return;
        }
        self.check_turn_complete();
    }

    fn on_synth_finished(&mut self, turn: u64) {
        if !self.turn_is_current(turn) {
            return;
        }
        debug!(turn, "synthesis finished");
        if let Some(t) = self.turn.as_mut() {
            t.flags.synthesis_done = true;
        }
        self.check_turn_complete();
    }

    /// Starts the fallback countdown for a synthesizer that never reports
    /// completion. Unlike the silence and flush timers this one is not
    /// superseded; it is tagged with the turn id and simply ignored if the
    /// turn is gone by the time it fires.
    fn arm_synthesis_fallback(&self, turn: u64) {
        let timeout = self.config.synthesis_fallback();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events
                .send(SessionEvent::SynthesisFallbackElapsed { turn })
                .await;
        });
    }

    fn on_synthesis_fallback(&mut self, turn: u64) {
        let Some(t) = self.turn.as_mut() else {
            return;
        };
        if t.id != turn || t.completing || t.flags.synthesis_done || !t.flags.generation_done {
            return;
        }
        warn!(turn, "no synthesis-finished signal; forcing completion");
        t.flags.synthesis_done = true;
        self.check_turn_complete();
    }

    /// The completion gate, re-evaluated after every relevant event.
    /// Idempotent: once the gate has passed, or once the session has left
    /// SPEAKING, further calls are no-ops.
    fn check_turn_complete(&mut self) {
        if !self.state.is(AgentState::Speaking) {
            return;
        }
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        if !turn.is_complete() {
            return;
        }
        turn.completing = true;
        let turn_id = turn.id;
        info!(turn = turn_id, "turn complete; settling");
        if let Some(synthesis) = self.synthesis.take() {
            synthesis.close();
        }
        let settle = self.config.settle_delay();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let _ = events.send(SessionEvent::SettleElapsed { turn: turn_id }).await;
        });
    }

    fn on_settle_elapsed(&mut self, turn: u64) {
        if !self.turn_is_current(turn) {
            return; // interrupted during the settle window
        }
        if !self.state.is(AgentState::Speaking) {
            return;
        }
        self.turn = None;
        self.speaking_since = None;
        self.state.set(AgentState::Listening);
        self.emit(SessionOutput::State(AgentState::Listening));
    }

    /// Fire-and-forget toward the transport. A client that cannot keep up
    /// loses frames rather than stalling the event loop.
    fn emit(&self, output: SessionOutput) {
        if let Err(error) = self.outbound.try_send(output) {
            warn!(%error, "outbound channel full or closed; dropping frame");
        }
    }

    fn teardown(&mut self) {
        if let Some(timer) = self.silence_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
        if let Some(synthesis) = self.synthesis.take() {
            synthesis.close();
        }
        self.turn = None;
        self.pending_transcript = None;
        self.buffer.clear();
        debug!("session torn down");
    }
}
