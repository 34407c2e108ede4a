//! Error types for recording, archiving and speech output.

use palma_core::PalmaError;

/// Errors from the audio collaborators.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no input device available")]
    NoDevice,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("recorder is disabled: {0}")]
    Disabled(String),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("speech output error: {0}")]
    Speech(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        AudioError::Archive(err.to_string())
    }
}

impl From<AudioError> for PalmaError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::Speech(msg) => PalmaError::Speech(msg),
            AudioError::Io(e) => PalmaError::Io(e),
            other => PalmaError::Audio(other.to_string()),
        }
    }
}
