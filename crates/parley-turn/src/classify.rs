//! Barge-in classification.
//!
//! The recognizer keeps transcribing while the agent speaks (full-duplex
//! listening), so its output during agent speech is a mix of echo,
//! backchannel noise, and genuine attempts to interrupt. This classifier is
//! the sole gate deciding which is which.

/// Hesitation and backchannel words that never count as an interruption when
/// they make up the whole transcript.
const BACKCHANNEL_TOKENS: &[&str] = &["uh", "um", "ah", "hmm", "like", "yeah", "okay"];

/// Decides whether a final transcript heard during agent speech is a genuine
/// interruption.
///
/// Pure and deterministic: the transcript is trimmed and lowercased, then it
/// is meaningful iff it is longer than three characters and is not a
/// whole-string match of a backchannel token.
pub fn is_meaningful_interruption(transcript: &str) -> bool {
    let normalized = transcript.trim().to_lowercase();
    normalized.chars().count() > 3 && !BACKCHANNEL_TOKENS.contains(&normalized.as_str())
}
