//! Streaming speech synthesis.
//!
//! A synthesis stream accepts text units in send order and renders them to
//! audio. Text sent before the vendor socket finishes connecting is queued
//! and delivered once the connection is up, so callers can enqueue speech the
//! moment a turn starts. An empty string is the end-of-input sentinel.

use crate::config::SynthesizerConfig;
use crate::error::VoiceError;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// Capacity of the per-stream audio event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events on a synthesis stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    /// Raw audio bytes ready for delivery to the client.
    Audio(Vec<u8>),
    /// The first audio of the stream has been produced.
    ChunkComplete,
    /// The vendor finished rendering all queued input.
    Finished,
}

/// One live synthesis stream.
pub trait Synthesizer: Send + Sync {
    /// Queues one text unit for synthesis. An empty string marks
    /// end-of-input.
    fn send_text(&self, text: &str);

    /// Tears the stream down. Idempotent; safe to call more than once.
    fn close(&self);
}

/// Opens one synthesis stream per agent turn.
pub trait SynthesizerFactory: Send + Sync {
    fn open(&self) -> Result<(Box<dyn Synthesizer>, mpsc::Receiver<SynthesisEvent>), VoiceError>;
}

enum SynthesizerCommand {
    Text(String),
    Close,
}

/// Audio frame on the vendor synthesis stream.
#[derive(Debug, Deserialize)]
struct SynthesisFrame {
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    is_final: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

/// Synthesizer backed by a vendor streaming text-to-speech WebSocket.
struct WsSynthesizer {
    commands: mpsc::UnboundedSender<SynthesizerCommand>,
}

impl Synthesizer for WsSynthesizer {
    fn send_text(&self, text: &str) {
        if self
            .commands
            .send(SynthesizerCommand::Text(text.to_string()))
            .is_err()
        {
            warn!(chars = text.len(), "synthesis stream already ended; dropping text");
        }
    }

    fn close(&self) {
        // A second close finds the command channel already drained or the io
        // task gone; both are harmless.
        let _ = self.commands.send(SynthesizerCommand::Close);
    }
}

/// Factory producing [`WsSynthesizer`] streams from a shared config.
pub struct WsSynthesizerFactory {
    config: SynthesizerConfig,
}

impl WsSynthesizerFactory {
    pub fn new(config: SynthesizerConfig) -> Self {
        Self { config }
    }
}

impl SynthesizerFactory for WsSynthesizerFactory {
    fn open(&self) -> Result<(Box<dyn Synthesizer>, mpsc::Receiver<SynthesisEvent>), VoiceError> {
        if self.config.url.is_empty() {
            return Err(VoiceError::Config(
                "synthesizer url is not configured".into(),
            ));
        }
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(run_stream(self.config.clone(), command_rx, event_tx));
        Ok((Box::new(WsSynthesizer { commands: command_tx }), event_rx))
    }
}

async fn run_stream(
    config: SynthesizerConfig,
    mut commands: mpsc::UnboundedReceiver<SynthesizerCommand>,
    events: mpsc::Sender<SynthesisEvent>,
) {
    let mut request = match config.url.as_str().into_client_request() {
        Ok(request) => request,
        Err(error) => {
            warn!(%error, "synthesizer url is not a valid request");
            return;
        }
    };
    match HeaderValue::from_str(&config.api_key) {
        Ok(value) => {
            request.headers_mut().insert("xi-api-key", value);
        }
        Err(_) => {
            warn!("synthesizer api key is not a valid header value");
            return;
        }
    }

    let (stream, _) = match connect_async(request).await {
        Ok(connected) => connected,
        Err(error) => {
            warn!(%error, "synthesizer connect failed");
            return;
        }
    };
    debug!("synthesis stream connected");
    let (mut sink, mut source) = stream.split();

    // The vendor requires a voice-settings frame before any text.
    let settings = serde_json::json!({
        "text": " ",
        "voice_settings": {
            "stability": config.stability,
            "similarity_boost": config.similarity_boost,
        },
    });
    if let Err(error) = sink.send(Message::Text(settings.to_string().into())).await {
        warn!(%error, "synthesizer settings frame failed");
        return;
    }

    let mut audio_produced = false;
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SynthesizerCommand::Text(text)) => {
                    let frame = if text.is_empty() {
                        // End-of-input sentinel.
                        serde_json::json!({ "text": "" })
                    } else {
                        serde_json::json!({ "text": text, "try_trigger_generation": true })
                    };
                    if let Err(error) = sink.send(Message::Text(frame.to_string().into())).await {
                        warn!(%error, "synthesizer send failed; ending stream");
                        break;
                    }
                }
                Some(SynthesizerCommand::Close) | None => {
                    let _ = sink.send(Message::Text(serde_json::json!({ "text": "" }).to_string().into())).await;
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<SynthesisFrame>(text.as_str()) {
                        Ok(frame) => {
                            if emit_frame(frame, &events, &mut audio_produced).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => warn!(%error, "unparseable synthesizer frame; skipping"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(%error, "synthesizer stream error; ending stream");
                    break;
                }
            },
        }
    }
    debug!("synthesis stream ended");
}

/// Maps one vendor frame to zero or more [`SynthesisEvent`]s. Returns `Err`
/// when the stream should end — the final frame was seen, or the event
/// receiver is gone.
async fn emit_frame(
    frame: SynthesisFrame,
    events: &mpsc::Sender<SynthesisEvent>,
    audio_produced: &mut bool,
) -> Result<(), ()> {
    if let Some(error) = frame.error {
        // Transient vendor error: log it and leave the stream open.
        warn!(%error, "synthesizer reported an error");
        return Ok(());
    }
    if let Some(audio) = frame.audio {
        match base64::engine::general_purpose::STANDARD.decode(audio.as_bytes()) {
            Ok(bytes) => {
                events
                    .send(SynthesisEvent::Audio(bytes))
                    .await
                    .map_err(|_| ())?;
                if !*audio_produced {
                    *audio_produced = true;
                    events
                        .send(SynthesisEvent::ChunkComplete)
                        .await
                        .map_err(|_| ())?;
                }
            }
            Err(error) => warn!(%error, "synthesizer audio frame with invalid base64; skipping"),
        }
    }
    if frame.is_final == Some(true) {
        events
            .send(SynthesisEvent::Finished)
            .await
            .map_err(|_| ())?;
        return Err(());
    }
    Ok(())
}
