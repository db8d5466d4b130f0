//! Streaming text generation.
//!
//! A generation stream yields tokens in generation order and ends with
//! exactly one terminal event: `Done` on success or `Failed` on error. The
//! two are mutually exclusive.

use crate::config::GeneratorConfig;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of the per-stream token channel.
const TOKEN_CHANNEL_CAPACITY: usize = 64;

/// Events on a generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// One incremental text fragment.
    Token(String),
    /// The stream completed normally.
    Done,
    /// The stream failed; no further events follow.
    Failed(String),
}

/// Streaming text generator.
///
/// `start` returns immediately; tokens arrive on the returned channel. The
/// caller owns the stream's lifetime through `cancel` — cancelling stops the
/// stream without a terminal event, since a cancelled turn has already moved
/// on.
pub trait Generator: Send + Sync {
    fn start(&self, prompt: &str, cancel: CancellationToken) -> mpsc::Receiver<GenerationEvent>;
}

/// One newline-delimited frame on the vendor token stream.
#[derive(Debug, Deserialize)]
struct TokenFrame {
    #[serde(default)]
    token: String,
    #[serde(default)]
    done: bool,
}

/// Generator backed by a vendor HTTP streaming endpoint.
pub struct HttpGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl HttpGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

impl Generator for HttpGenerator {
    fn start(&self, prompt: &str, cancel: CancellationToken) -> mpsc::Receiver<GenerationEvent> {
        let (event_tx, event_rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        let client = self.client.clone();
        let config = self.config.clone();
        let prompt = prompt.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("generation stream cancelled");
                }
                _ = stream_tokens(client, config, prompt, event_tx) => {}
            }
        });
        event_rx
    }
}

async fn stream_tokens(
    client: reqwest::Client,
    config: GeneratorConfig,
    prompt: String,
    events: mpsc::Sender<GenerationEvent>,
) {
    let response = client
        .post(&config.url)
        .bearer_auth(&config.api_key)
        .json(&serde_json::json!({
            "model": config.model,
            "prompt": prompt,
            "stream": true,
        }))
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(error) => {
            let _ = events
                .send(GenerationEvent::Failed(error.to_string()))
                .await;
            return;
        }
    };
    if !response.status().is_success() {
        let _ = events
            .send(GenerationEvent::Failed(format!(
                "generator returned {}",
                response.status()
            )))
            .await;
        return;
    }

    let mut stream = response.bytes_stream();
    let mut pending = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                let _ = events
                    .send(GenerationEvent::Failed(error.to_string()))
                    .await;
                return;
            }
        };
        pending.extend_from_slice(&chunk);
        while let Some(newline) = pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = pending.drain(..=newline).collect();
            match parse_token_frame(&line) {
                Some(frame) if frame.done => {
                    let _ = events.send(GenerationEvent::Done).await;
                    return;
                }
                Some(frame) if !frame.token.is_empty() => {
                    if events
                        .send(GenerationEvent::Token(frame.token))
                        .await
                        .is_err()
                    {
                        // Receiver gone: the turn was torn down.
                        return;
                    }
                }
                Some(_) => {}
                None => warn!("unparseable generator frame; skipping"),
            }
        }
    }
    let _ = events.send(GenerationEvent::Done).await;
}

/// Parses one stream line, tolerating blank keep-alive lines.
fn parse_token_frame(line: &[u8]) -> Option<TokenFrame> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return Some(TokenFrame {
            token: String::new(),
            done: false,
        });
    }
    serde_json::from_str(text).ok()
}
