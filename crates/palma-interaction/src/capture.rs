//! Voice capture coordinator.
//!
//! Runs one capture off the primary loop, strictly in order: speak the
//! listening prompt, wait for speech output to go idle plus a grace interval,
//! count down, record a fixed window, transcribe, archive the audio.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use palma_audio::{resample, AudioArchive, AudioError, AudioRecorder, SpeechOutput};
use palma_core::config::VoiceConfig;
use palma_core::PalmaError;
use palma_whisper::{TranscriptionService, WHISPER_SAMPLE_RATE};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prompt spoken before the countdown.
pub const LISTENING_PROMPT: &str = "Escutando";

/// How often speech output is polled while waiting for it to finish.
const SPEECH_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("voice model not ready")]
    NotReady,
    #[error("recording failed: {0}")]
    Recording(#[from] AudioError),
    #[error("transcription failed: {0}")]
    Transcription(PalmaError),
    #[error("nothing was heard")]
    EmptyTranscript,
    #[error("capture task failed: {0}")]
    Aborted(String),
}

impl From<CaptureError> for PalmaError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Recording(e) => e.into(),
            CaptureError::Transcription(e) => e,
            other => PalmaError::Interaction(other.to_string()),
        }
    }
}

/// Progress reported while a capture runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProgress {
    /// Countdown value now showing (3, 2, 1).
    Tick(u8),
    /// Countdown finished; recording starts now.
    Recording,
}

/// Loading state of the speech-to-text model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Loading,
    Ready,
    Unavailable,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Loading => write!(f, "Carregando..."),
            ModelStatus::Ready => write!(f, "OK"),
            ModelStatus::Unavailable => write!(f, "OFF"),
        }
    }
}

/// Timing of one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub grace: Duration,
    pub countdown_from: u8,
    pub tick: Duration,
    pub window: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from(&VoiceConfig::default())
    }
}

impl From<&VoiceConfig> for CaptureSettings {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            grace: Duration::from_millis(config.grace_ms),
            countdown_from: config.countdown_from,
            tick: Duration::from_millis(config.countdown_tick_ms),
            window: Duration::from_secs(u64::from(config.record_secs)),
        }
    }
}

/// A finished capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Captured {
    pub text: String,
    /// Where the audio was archived, if it was.
    pub audio_file: Option<PathBuf>,
}

pub struct VoiceCaptureCoordinator {
    speech: Arc<dyn SpeechOutput>,
    recorder: Arc<dyn AudioRecorder>,
    transcriber: OnceLock<Arc<dyn TranscriptionService>>,
    model_failed: AtomicBool,
    archive: Option<AudioArchive>,
    settings: CaptureSettings,
}

impl VoiceCaptureCoordinator {
    /// Coordinator with no model yet; see `install_transcriber`.
    pub fn new(
        speech: Arc<dyn SpeechOutput>,
        recorder: Arc<dyn AudioRecorder>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            speech,
            recorder,
            transcriber: OnceLock::new(),
            model_failed: AtomicBool::new(false),
            archive: None,
            settings,
        }
    }

    /// Archive every captured window under `archive`.
    pub fn with_archive(mut self, archive: AudioArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Make the loaded model available. Only the first call takes effect.
    pub fn install_transcriber(&self, transcriber: Arc<dyn TranscriptionService>) -> bool {
        let installed = self.transcriber.set(transcriber).is_ok();
        if installed {
            info!("Voice model ready");
        }
        installed
    }

    /// Record that the model could not be loaded.
    pub fn mark_unavailable(&self) {
        self.model_failed.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.transcriber.get().is_some()
    }

    pub fn model_status(&self) -> ModelStatus {
        if self.is_ready() {
            ModelStatus::Ready
        } else if self.model_failed.load(Ordering::SeqCst) {
            ModelStatus::Unavailable
        } else {
            ModelStatus::Loading
        }
    }

    /// Run one capture, reporting countdown progress through `progress`.
    pub async fn capture(
        &self,
        cycle_id: Uuid,
        progress: impl Fn(CaptureProgress) + Send,
    ) -> Result<Captured, CaptureError> {
        let transcriber = self.transcriber.get().cloned().ok_or(CaptureError::NotReady)?;

        self.speech.speak(LISTENING_PROMPT);
        self.wait_for_silence().await;
        tokio::time::sleep(self.settings.grace).await;

        for remaining in (1..=self.settings.countdown_from).rev() {
            progress(CaptureProgress::Tick(remaining));
            tokio::time::sleep(self.settings.tick).await;
        }
        progress(CaptureProgress::Recording);

        debug!(cycle = %cycle_id, window_secs = self.settings.window.as_secs(), "Recording");
        let clip = self.recorder.record(self.settings.window).await?;

        let samples = resample(&clip.samples, clip.sample_rate, WHISPER_SAMPLE_RATE);
        let transcribed = if samples.is_empty() {
            Err(CaptureError::EmptyTranscript)
        } else {
            match transcriber.transcribe(&samples, WHISPER_SAMPLE_RATE).await {
                Ok(t) if t.is_blank() => Err(CaptureError::EmptyTranscript),
                Ok(t) => Ok(t.text.trim().to_string()),
                Err(e) => Err(CaptureError::Transcription(e)),
            }
        };

        let audio_file = match &self.archive {
            Some(archive) if !clip.is_empty() => match archive.save(&clip, cycle_id) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(cycle = %cycle_id, error = %e, "Failed to archive command audio");
                    None
                }
            },
            _ => None,
        };

        let text = transcribed?;
        info!(cycle = %cycle_id, text = %text, "Transcribed command");
        Ok(Captured { text, audio_file })
    }

    async fn wait_for_silence(&self) {
        while self.speech.is_speaking() {
            tokio::time::sleep(SPEECH_POLL).await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
