//! Error types for the Vox gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Vox gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Language model error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio encoding/decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Malformed chunk stream
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Recognition produced no text
    #[error("no speech detected")]
    NoSpeech,

    /// A required model handle was not loaded
    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    /// Pipeline name not present in the registry
    #[error("unknown pipeline: {0}")]
    UnknownPipeline(String),

    /// No conversation log registered under this name
    #[error("unknown conversation: {0}")]
    UnknownConversation(String),

    /// Worker task failed to complete
    #[error("worker error: {0}")]
    Worker(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Worker(e.to_string())
    }
}
