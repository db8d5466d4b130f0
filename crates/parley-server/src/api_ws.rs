//! WebSocket API handler and live-session wiring.
//!
//! `GET /ws` upgrades the connection and wires three pieces together: a
//! recognizer stream fed from inbound audio chunks, one turn-orchestrator
//! session, and a forwarder that serializes session output onto the socket.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use parley_turn::{Session, SessionEvent, SessionOutput};
use parley_types::AgentState;
use parley_voice::RecognizerEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Incoming WebSocket message types.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// One chunk of microphone audio, base64-encoded 16-bit PCM.
    #[serde(rename = "audio_chunk")]
    AudioChunk { pcm: String },
    /// Explicit request to stop the agent mid-reply.
    #[serde(rename = "interrupt")]
    Interrupt,
}

/// Outgoing WebSocket message types.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Conversation state change.
    #[serde(rename = "state")]
    State { value: AgentState },
    /// Interim transcript of what the user is saying.
    #[serde(rename = "partial_transcript")]
    PartialTranscript { text: String },
    /// One chunk of synthesized agent speech, base64-encoded.
    #[serde(rename = "agent_audio")]
    AgentAudio { audio: String },
}

impl From<SessionOutput> for ServerEvent {
    fn from(output: SessionOutput) -> Self {
        match output {
            SessionOutput::State(value) => Self::State { value },
            SessionOutput::PartialTranscript(text) => Self::PartialTranscript { text },
            SessionOutput::AgentAudio(bytes) => Self::AgentAudio {
                audio: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        }
    }
}

/// WebSocket handler: `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles one live voice connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    tracing::info!(%connection_id, "voice connection opened");

    let (mut sender, mut receiver) = socket.split();

    // One orchestrator per connection. It emits the initial LISTENING
    // notification as soon as it starts.
    let (session, mut outputs) = Session::spawn(
        state.turn_config.clone(),
        state.synthesizer_factory.clone(),
        state.generator.clone(),
    );

    // One recognizer stream per connection. A session without a recognizer
    // stays up — the client just gets no transcription.
    let recognizer = match state.recognizer_factory.open() {
        Ok((recognizer, events)) => {
            forward_recognizer_events(events, session.events());
            Some(recognizer)
        }
        Err(error) => {
            tracing::error!(%connection_id, %error, "recognizer unavailable; session will hear nothing");
            None
        }
    };

    // Serialize session output onto the socket.
    let send_task = tokio::spawn(async move {
        while let Some(output) = outputs.recv().await {
            let event = ServerEvent::from(output);
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(error) => {
                    tracing::error!(%error, "failed to serialize server event");
                    continue;
                }
            };
            if sender.send(AxumMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound loop. Malformed messages are dropped with a warning; the
    // connection stays open.
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            AxumMessage::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => event,
                    Err(_) => {
                        tracing::warn!(%connection_id, "unrecognized client message; dropping");
                        continue;
                    }
                };
                match event {
                    ClientEvent::AudioChunk { pcm } => {
                        match base64::engine::general_purpose::STANDARD.decode(pcm.as_bytes()) {
                            Ok(bytes) => {
                                if let Some(recognizer) = recognizer.as_ref() {
                                    recognizer.write(&bytes);
                                }
                            }
                            Err(_) => {
                                tracing::warn!(%connection_id, "audio chunk with invalid base64; dropping");
                            }
                        }
                    }
                    ClientEvent::Interrupt => {
                        let _ = session.events().send(SessionEvent::ClientInterrupt).await;
                    }
                }
            }
            AxumMessage::Close(_) => break,
            _ => {}
        }
    }

    // Teardown: the session cancels its timers and releases the active
    // synthesis stream before the task exits.
    if let Some(recognizer) = recognizer {
        recognizer.close();
    }
    session.shutdown().await;
    send_task.abort();
    tracing::info!(%connection_id, "voice connection closed");
}

/// Pumps recognizer results into the session's event channel.
fn forward_recognizer_events(
    mut source: mpsc::Receiver<RecognizerEvent>,
    events: mpsc::Sender<SessionEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = source.recv().await {
            let mapped = match event {
                RecognizerEvent::Partial(text) => SessionEvent::Partial(text),
                RecognizerEvent::Final(text) => SessionEvent::Final(text),
            };
            if events.send(mapped).await.is_err() {
                break;
            }
        }
    });
}
