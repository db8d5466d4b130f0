//! Token buffering between the generation stream and the synthesizer.
//!
//! Generation yields text a few characters at a time; feeding each fragment
//! straight to the synthesizer produces choppy prosody, while waiting for the
//! whole reply wastes the streaming latency win. The buffer accumulates
//! tokens and releases them at sentence boundaries, on a length threshold, or
//! after a short debounce — whichever comes first.

/// Decision returned by [`TokenBuffer::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Flush now: a sentence just ended or the buffer is long enough.
    FlushNow,
    /// Keep accumulating; (re)arm the debounce timer.
    Debounce,
}

/// Accumulator for incremental generation output.
#[derive(Debug)]
pub struct TokenBuffer {
    text: String,
    flush_threshold: usize,
}

impl TokenBuffer {
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            text: String::new(),
            flush_threshold,
        }
    }

    /// Appends one token and reports whether the buffer should flush
    /// immediately.
    pub fn push(&mut self, token: &str) -> PushOutcome {
        self.text.push_str(token);
        if ends_with_sentence_terminal(&self.text) || self.text.len() > self.flush_threshold {
            PushOutcome::FlushNow
        } else {
            PushOutcome::Debounce
        }
    }

    /// Takes the whole buffer as one synthesis unit, leaving it empty.
    /// Returns `None` when nothing is pending.
    pub fn take(&mut self) -> Option<String> {
        if self.text.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.text))
        }
    }

    /// Discards any pending content.
    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// True when the text ends in `.`, `!`, or `?`, ignoring trailing whitespace.
fn ends_with_sentence_terminal(text: &str) -> bool {
    matches!(text.trim_end().chars().last(), Some('.' | '!' | '?'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentence_terminal_triggers_immediate_flush() {
        let mut buffer = TokenBuffer::new(30);
        assert_eq!(buffer.push("Hello"), PushOutcome::Debounce);
        assert_eq!(buffer.push(" there"), PushOutcome::Debounce);
        assert_eq!(buffer.push("."), PushOutcome::FlushNow);
        assert_eq!(buffer.take(), Some("Hello there.".to_string()));
        assert!(buffer.is_empty());
    }

    #[test]
    fn terminal_followed_by_whitespace_still_flushes() {
        let mut buffer = TokenBuffer::new(30);
        assert_eq!(buffer.push("Sure! "), PushOutcome::FlushNow);
        assert_eq!(buffer.push("Done?\n"), PushOutcome::FlushNow);
    }

    #[test]
    fn length_threshold_triggers_immediate_flush() {
        let mut buffer = TokenBuffer::new(10);
        assert_eq!(buffer.push("twelve chars"), PushOutcome::FlushNow);
    }

    #[test]
    fn take_on_empty_buffer_is_none() {
        let mut buffer = TokenBuffer::new(30);
        assert_eq!(buffer.take(), None);
        buffer.push("x");
        buffer.clear();
        assert_eq!(buffer.take(), None);
    }

    #[test]
    fn flushes_reproduce_the_token_sequence_exactly() {
        // Round-trip property: concatenating every flushed unit yields the
        // concatenated input, nothing dropped or duplicated.
        let tokens = ["Well", ", ", "yes", ". ", "And ", "also ", "this ", "trailing bit"];
        let mut buffer = TokenBuffer::new(12);
        let mut flushed = String::new();
        for token in tokens {
            if buffer.push(token) == PushOutcome::FlushNow {
                flushed.push_str(&buffer.take().expect("non-empty after FlushNow"));
            }
        }
        // Forced end-of-stream flush of the remainder.
        if let Some(rest) = buffer.take() {
            flushed.push_str(&rest);
        }
        assert_eq!(flushed, tokens.concat());
    }
}
