//! Error types for the Beamo companion device

use thiserror::Error;

/// Result type alias for Beamo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Beamo device
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone capture error
    #[error("capture error: {0}")]
    Capture(String),

    /// Wake word listener error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Speech was captured but could not be understood
    #[error("speech not recognized")]
    SpeechUnrecognized,

    /// Speech-to-text service error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech synthesis error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Command router error
    #[error("router error: {0}")]
    Router(String),

    /// Face asset error (missing or empty frame set)
    #[error("face error: {0}")]
    Face(String),

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
