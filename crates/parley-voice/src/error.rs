use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("recognizer error: {0}")]
    Recognizer(String),

    #[error("generator error: {0}")]
    Generator(String),

    #[error("synthesizer error: {0}")]
    Synthesizer(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
