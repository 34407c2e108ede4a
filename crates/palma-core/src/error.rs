use thiserror::Error;

/// Top-level error type for the Palma assistant.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for PalmaError`
/// so that `?` works across crate boundaries.
///
/// `Config` covers collaborators that could not be brought up at startup;
/// the owning capability is disabled, the process keeps running.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PalmaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hand tracking error: {0}")]
    Gesture(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Speech output error: {0}")]
    Speech(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Interaction error: {0}")]
    Interaction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for PalmaError {
    fn from(err: toml::de::Error) -> Self {
        PalmaError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PalmaError {
    fn from(err: toml::ser::Error) -> Self {
        PalmaError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PalmaError {
    fn from(err: serde_json::Error) -> Self {
        PalmaError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Palma operations.
pub type Result<T> = std::result::Result<T, PalmaError>;
