//! Streaming speech recognition.
//!
//! A recognizer is fed 16-bit PCM audio and delivers zero or more partial
//! results per utterance segment followed by exactly one final result.

use crate::config::RecognizerConfig;
use crate::error::VoiceError;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// Capacity of the per-stream transcript channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A transcription result delivered by a recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Interim hypothesis for the current utterance; may still be revised.
    Partial(String),
    /// Stable result for an utterance segment.
    Final(String),
}

/// One live transcription stream: raw PCM in, transcripts out.
pub trait Recognizer: Send + Sync {
    /// Feeds raw 16-bit PCM bytes into the stream.
    fn write(&self, pcm: &[u8]);

    /// Ends the stream. Safe to call more than once.
    fn close(&self);
}

/// Opens one recognizer stream per session.
pub trait RecognizerFactory: Send + Sync {
    fn open(&self) -> Result<(Box<dyn Recognizer>, mpsc::Receiver<RecognizerEvent>), VoiceError>;
}

enum RecognizerCommand {
    Audio(Vec<u8>),
    Close,
}

/// Result frame on the vendor transcription stream.
#[derive(Debug, Deserialize)]
struct TranscriptFrame {
    transcript: String,
    #[serde(default)]
    is_final: bool,
}

/// Recognizer backed by a vendor streaming-transcription WebSocket.
///
/// Audio written before the socket finishes connecting is queued in the
/// command channel and sent once the connection is up.
struct WsRecognizer {
    commands: mpsc::UnboundedSender<RecognizerCommand>,
}

impl Recognizer for WsRecognizer {
    fn write(&self, pcm: &[u8]) {
        if self
            .commands
            .send(RecognizerCommand::Audio(pcm.to_vec()))
            .is_err()
        {
            debug!(bytes = pcm.len(), "recognizer stream already ended; dropping audio");
        }
    }

    fn close(&self) {
        let _ = self.commands.send(RecognizerCommand::Close);
    }
}

/// Factory producing [`WsRecognizer`] streams from a shared config.
pub struct WsRecognizerFactory {
    config: RecognizerConfig,
}

impl WsRecognizerFactory {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }
}

impl RecognizerFactory for WsRecognizerFactory {
    fn open(&self) -> Result<(Box<dyn Recognizer>, mpsc::Receiver<RecognizerEvent>), VoiceError> {
        if self.config.url.is_empty() {
            return Err(VoiceError::Config("recognizer url is not configured".into()));
        }
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(run_stream(self.config.clone(), command_rx, event_tx));
        Ok((Box::new(WsRecognizer { commands: command_tx }), event_rx))
    }
}

async fn run_stream(
    config: RecognizerConfig,
    mut commands: mpsc::UnboundedReceiver<RecognizerCommand>,
    events: mpsc::Sender<RecognizerEvent>,
) {
    let url = format!("{}?sample_rate={}", config.url, config.sample_rate_hz);
    let mut request = match url.into_client_request() {
        Ok(request) => request,
        Err(error) => {
            warn!(%error, "recognizer url is not a valid request");
            return;
        }
    };
    match HeaderValue::from_str(&format!("Token {}", config.api_key)) {
        Ok(value) => {
            request.headers_mut().insert("authorization", value);
        }
        Err(_) => {
            warn!("recognizer api key is not a valid header value");
            return;
        }
    }

    let (stream, _) = match connect_async(request).await {
        Ok(connected) => connected,
        Err(error) => {
            warn!(%error, "recognizer connect failed");
            return;
        }
    };
    debug!("recognizer stream connected");
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(RecognizerCommand::Audio(pcm)) => {
                    if let Err(error) = sink.send(Message::Binary(pcm.into())).await {
                        warn!(%error, "recognizer send failed; ending stream");
                        break;
                    }
                }
                Some(RecognizerCommand::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // Malformed result frames are transient: log and keep the
                    // stream open.
                    match serde_json::from_str::<TranscriptFrame>(text.as_str()) {
                        Ok(frame) if frame.transcript.is_empty() => {}
                        Ok(frame) => {
                            let event = if frame.is_final {
                                RecognizerEvent::Final(frame.transcript)
                            } else {
                                RecognizerEvent::Partial(frame.transcript)
                            };
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            warn!(%error, "unparseable recognizer frame; skipping");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(%error, "recognizer stream error; ending stream");
                    break;
                }
            },
        }
    }
    debug!("recognizer stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_frame_defaults_to_partial() {
        let frame: TranscriptFrame =
            serde_json::from_str(r#"{"transcript": "hello"}"#).expect("parse");
        assert_eq!(frame.transcript, "hello");
        assert!(!frame.is_final);
    }

    #[test]
    fn transcript_frame_final_flag() {
        let frame: TranscriptFrame =
            serde_json::from_str(r#"{"transcript": "hello there", "is_final": true}"#)
                .expect("parse");
        assert!(frame.is_final);
    }

    #[test]
    fn open_without_url_is_a_config_error() {
        let factory = WsRecognizerFactory::new(RecognizerConfig::default());
        assert!(matches!(factory.open(), Err(VoiceError::Config(_))));
    }
}
