//! Turn life-cycle tuning.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_quiet_interval_ms() -> u64 {
    300
}

fn default_flush_threshold_chars() -> usize {
    30
}

fn default_flush_debounce_ms() -> u64 {
    30
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_synthesis_fallback_ms() -> u64 {
    5_000
}

/// Timing and buffering knobs for the turn life cycle.
///
/// These are latency/quality trades, not structural guarantees — tests and
/// deployments tune them freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Quiet interval after the last recognizer event before an utterance
    /// commits and a turn starts.
    #[serde(default = "default_quiet_interval_ms")]
    pub quiet_interval_ms: u64,

    /// Token-buffer length past which a flush happens immediately.
    #[serde(default = "default_flush_threshold_chars")]
    pub flush_threshold_chars: usize,

    /// Delay after the last token before a partial buffer is flushed anyway.
    #[serde(default = "default_flush_debounce_ms")]
    pub flush_debounce_ms: u64,

    /// Pause between turn completion and the state notification, so
    /// in-flight audio can finish delivering.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// How long to wait for a synthesis-finished signal after generation
    /// ends before forcing completion.
    #[serde(default = "default_synthesis_fallback_ms")]
    pub synthesis_fallback_ms: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            quiet_interval_ms: default_quiet_interval_ms(),
            flush_threshold_chars: default_flush_threshold_chars(),
            flush_debounce_ms: default_flush_debounce_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            synthesis_fallback_ms: default_synthesis_fallback_ms(),
        }
    }
}

impl TurnConfig {
    pub fn quiet_interval(&self) -> Duration {
        Duration::from_millis(self.quiet_interval_ms)
    }

    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn synthesis_fallback(&self) -> Duration {
        Duration::from_millis(self.synthesis_fallback_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let config = TurnConfig::default();
        assert_eq!(config.quiet_interval(), Duration::from_millis(300));
        assert_eq!(config.flush_threshold_chars, 30);
        assert_eq!(config.flush_debounce(), Duration::from_millis(30));
        assert_eq!(config.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.synthesis_fallback(), Duration::from_millis(5_000));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: TurnConfig = toml::from_str("quiet_interval_ms = 150").expect("parse TOML");
        assert_eq!(config.quiet_interval_ms, 150);
        assert_eq!(config.settle_delay_ms, 500);
    }
}
