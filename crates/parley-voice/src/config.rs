//! Per-collaborator connection settings.
//!
//! Each config carries the vendor endpoint and credentials for one streaming
//! collaborator. API secrets are redacted from `Debug` output so they never
//! leak into logs.

use parley_types::PCM_SAMPLE_RATE_HZ;
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_sample_rate_hz() -> u32 {
    PCM_SAMPLE_RATE_HZ
}

fn default_stability() -> f32 {
    0.6
}

fn default_similarity_boost() -> f32 {
    0.8
}

/// Connection settings for the streaming speech recognizer.
#[derive(Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// WebSocket endpoint of the transcription stream.
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Sample rate of the 16-bit PCM audio fed into the stream.
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            sample_rate_hz: default_sample_rate_hz(),
        }
    }
}

impl fmt::Debug for RecognizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognizerConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("sample_rate_hz", &self.sample_rate_hz)
            .finish()
    }
}

/// Connection settings for the streaming text generator.
#[derive(Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// HTTP endpoint that streams newline-delimited token frames.
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Model identifier passed through in the request body.
    #[serde(default)]
    pub model: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            model: String::new(),
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

/// Connection settings for the streaming speech synthesizer.
#[derive(Clone, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    /// WebSocket endpoint of the text-to-speech input stream.
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Voice stability sent in the stream's opening settings frame.
    #[serde(default = "default_stability")]
    pub stability: f32,
    /// Similarity boost sent in the stream's opening settings frame.
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
        }
    }
}

impl fmt::Debug for SynthesizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesizerConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("stability", &self.stability)
            .field("similarity_boost", &self.similarity_boost)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizer_config_defaults_from_toml() {
        let config: RecognizerConfig = toml::from_str(
            r#"
            url = "wss://stt.example.com/v1/stream"
            api_key = "k"
            "#,
        )
        .expect("parse TOML");
        assert_eq!(config.sample_rate_hz, 16_000);
    }

    #[test]
    fn synthesizer_config_defaults_from_toml() {
        let config: SynthesizerConfig = toml::from_str(
            r#"
            url = "wss://tts.example.com/v1/stream-input"
            api_key = "k"
            "#,
        )
        .expect("parse TOML");
        assert!((config.stability - 0.6).abs() < f32::EPSILON);
        assert!((config.similarity_boost - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = GeneratorConfig {
            url: "https://llm.example.com".into(),
            api_key: "super-secret".into(),
            model: "m".into(),
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
