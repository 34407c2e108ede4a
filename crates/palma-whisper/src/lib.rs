//! Palma Whisper crate - Speech-to-text collaborator.
//!
//! Defines the transcription seam used by the voice-capture coordinator,
//! a configurable mock for tests, and a whisper.cpp-backed service behind
//! the `whisper` feature.

pub mod whisper_service;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use palma_core::config::VoiceConfig;
use palma_core::PalmaError;

pub use whisper_service::WhisperService;

/// Sample rate the transcriber expects (mono PCM).
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Whisper transcription engine.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the GGML model file.
    pub model_path: PathBuf,
    /// Language hint (e.g., "pt", "auto").
    pub language: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            language: "pt".to_string(),
        }
    }
}

impl WhisperConfig {
    /// Resolve from the `[voice]` section. An empty `model_path` points at
    /// `<data_dir>/models/ggml-<whisper_model>.bin`.
    pub fn from_voice(voice: &VoiceConfig, data_dir: &Path) -> Self {
        let model_path = if voice.model_path.is_empty() {
            data_dir
                .join("models")
                .join(format!("ggml-{}.bin", voice.whisper_model))
        } else {
            PathBuf::from(&voice.model_path)
        };
        Self {
            model_path,
            language: voice.language.clone(),
        }
    }
}

// =============================================================================
// Result types
// =============================================================================

/// The result of one transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Full transcribed text, trimmed.
    pub text: String,
    /// Language hint the model ran with.
    pub language: String,
    /// Audio duration in seconds.
    pub duration_secs: f32,
}

impl Transcript {
    /// Whisper emits blank text (or only punctuation) for silence.
    pub fn is_blank(&self) -> bool {
        !self.text.chars().any(char::is_alphanumeric)
    }
}

// =============================================================================
// Trait
// =============================================================================

/// Service for transcribing a captured audio window.
///
/// Callers serialize access; implementations are only required to handle
/// one call at a time.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe mono PCM samples in [-1.0, 1.0].
    async fn transcribe(&self, audio: &[f32], sample_rate: u32) -> Result<Transcript, PalmaError>;
}

fn validate_input(audio: &[f32], sample_rate: u32) -> Result<(), PalmaError> {
    if audio.is_empty() {
        return Err(PalmaError::Transcription(
            "Cannot transcribe empty audio data".to_string(),
        ));
    }
    if sample_rate == 0 {
        return Err(PalmaError::Transcription(
            "Sample rate must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Mock transcription service returning a scripted response.
///
/// Used in tests and when running without a model. Counts calls so tests
/// can assert how many cycles reached transcription.
#[derive(Debug)]
pub struct MockTranscriptionService {
    response: Mutex<Result<String, String>>,
    calls: AtomicUsize,
}

impl Default for MockTranscriptionService {
    fn default() -> Self {
        Self::with_text("[mock transcription]")
    }
}

impl MockTranscriptionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            response: Mutex::new(Ok(text.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with a transcription error carrying `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            response: Mutex::new(Err(reason.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replace the scripted text for subsequent calls.
    pub fn set_text(&self, text: &str) {
        *self.response.lock().unwrap_or_else(|p| p.into_inner()) = Ok(text.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionService for MockTranscriptionService {
    async fn transcribe(&self, audio: &[f32], sample_rate: u32) -> Result<Transcript, PalmaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        validate_input(audio, sample_rate)?;

        let duration_secs = audio.len() as f32 / sample_rate as f32;
        let response = self
            .response
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();

        tracing::debug!(duration_secs, sample_rate, "Mock transcription generated");

        match response {
            Ok(text) => Ok(Transcript {
                text: text.trim().to_string(),
                language: "pt".to_string(),
                duration_secs,
            }),
            Err(reason) => Err(PalmaError::Transcription(reason)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transcription_basic() {
        let service = MockTranscriptionService::with_text("  abrir calculadora ");
        let audio = vec![0.0f32; 16000 * 5];
        let result = service.transcribe(&audio, 16000).await.unwrap();

        assert_eq!(result.text, "abrir calculadora");
        assert_eq!(result.language, "pt");
        assert!((result.duration_secs - 5.0).abs() < 0.01);
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_transcription_empty_audio() {
        let service = MockTranscriptionService::new();
        assert!(service.transcribe(&[], 16000).await.is_err());
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_transcription_zero_sample_rate() {
        let service = MockTranscriptionService::new();
        let audio = vec![0.0f32; 100];
        assert!(service.transcribe(&audio, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_failing_and_set_text() {
        let service = MockTranscriptionService::failing("model crashed");
        let audio = vec![0.0f32; 160];
        let err = service.transcribe(&audio, 16000).await.unwrap_err();
        assert!(matches!(err, PalmaError::Transcription(ref m) if m == "model crashed"));

        service.set_text("que horas são");
        let ok = service.transcribe(&audio, 16000).await.unwrap();
        assert_eq!(ok.text, "que horas são");
    }

    #[test]
    fn test_transcript_blank_detection() {
        let blank = Transcript {
            text: " . ".to_string(),
            language: "pt".to_string(),
            duration_secs: 5.0,
        };
        assert!(blank.is_blank());
        let spoken = Transcript {
            text: "olá".to_string(),
            ..blank
        };
        assert!(!spoken.is_blank());
    }

    #[test]
    fn test_whisper_config_from_voice() {
        let voice = VoiceConfig::default();
        let config = WhisperConfig::from_voice(&voice, Path::new("/data"));
        assert_eq!(config.model_path, PathBuf::from("/data/models/ggml-base.bin"));
        assert_eq!(config.language, "pt");

        let explicit = VoiceConfig {
            model_path: "/opt/ggml-small.bin".to_string(),
            ..VoiceConfig::default()
        };
        let config = WhisperConfig::from_voice(&explicit, Path::new("/data"));
        assert_eq!(config.model_path, PathBuf::from("/opt/ggml-small.bin"));
    }
}
