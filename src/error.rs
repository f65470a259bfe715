//! Error types for the lookout assistant

use thiserror::Error;

/// Result type alias for lookout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the lookout assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Camera permission or device failure
    #[error("camera error: {0}")]
    Camera(String),

    /// Frame capture failure (no frame available)
    #[error("capture error: {0}")]
    Capture(String),

    /// Scene analysis failure
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Voice input capability missing
    #[error("voice input unavailable: {0}")]
    Voice(String),

    /// Speech recognition failure
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Question answering failure
    #[error("answer error: {0}")]
    Answer(String),

    /// Speech synthesis or playback failure
    #[error("speech error: {0}")]
    Speech(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Session controller has been torn down
    #[error("session closed")]
    Closed,

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
