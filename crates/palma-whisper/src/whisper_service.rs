//! whisper.cpp transcription via whisper-rs.
//!
//! With the `whisper` feature, loads a GGML model file once and runs
//! inference on a blocking thread per call. Without the feature the
//! service still constructs, but every call fails, so the capability
//! stays disabled.

#[cfg(feature = "whisper")]
use std::sync::Arc;

use async_trait::async_trait;
use palma_core::PalmaError;

#[cfg(feature = "whisper")]
use crate::WHISPER_SAMPLE_RATE;
use crate::{validate_input, Transcript, TranscriptionService, WhisperConfig};

/// Whisper transcription service backed by whisper.cpp.
pub struct WhisperService {
    #[cfg(feature = "whisper")]
    ctx: Arc<whisper_rs::WhisperContext>,
    config: WhisperConfig,
}

impl WhisperService {
    /// Load a GGML model file. Slow (seconds); run it off the primary loop.
    ///
    /// # Errors
    /// Returns `PalmaError::Transcription` if the model file is missing or
    /// fails to load.
    #[cfg(feature = "whisper")]
    pub fn new(config: WhisperConfig) -> Result<Self, PalmaError> {
        use whisper_rs::{WhisperContext, WhisperContextParameters};

        let model_path = &config.model_path;
        if !model_path.exists() {
            return Err(PalmaError::Transcription(format!(
                "Whisper model file not found: {}",
                model_path.display()
            )));
        }

        tracing::info!(model = %model_path.display(), lang = %config.language, "Loading Whisper model");

        let path_str = model_path.to_string_lossy();
        let ctx = WhisperContext::new_with_params(&path_str, WhisperContextParameters::default())
            .map_err(|e| {
                PalmaError::Transcription(format!("Failed to load Whisper model: {}", e))
            })?;

        tracing::info!("Whisper model loaded successfully");
        Ok(Self {
            ctx: Arc::new(ctx),
            config,
        })
    }

    #[cfg(not(feature = "whisper"))]
    pub fn new(config: WhisperConfig) -> Result<Self, PalmaError> {
        tracing::warn!("WhisperService created without `whisper` feature; transcription will fail");
        Ok(Self { config })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
#[async_trait]
impl TranscriptionService for WhisperService {
    async fn transcribe(&self, audio: &[f32], sample_rate: u32) -> Result<Transcript, PalmaError> {
        validate_input(audio, sample_rate)?;
        if sample_rate != WHISPER_SAMPLE_RATE {
            return Err(PalmaError::Transcription(format!(
                "Whisper expects {} Hz audio, got {} Hz",
                WHISPER_SAMPLE_RATE, sample_rate
            )));
        }

        let ctx = Arc::clone(&self.ctx);
        let samples = audio.to_vec();
        let language = self.config.language.clone();

        tokio::task::spawn_blocking(move || run_inference(&ctx, &samples, &language))
            .await
            .map_err(|e| PalmaError::Transcription(format!("Whisper worker panicked: {}", e)))?
    }
}

#[cfg(feature = "whisper")]
fn run_inference(
    ctx: &whisper_rs::WhisperContext,
    samples: &[f32],
    language: &str,
) -> Result<Transcript, PalmaError> {
    use whisper_rs::{FullParams, SamplingStrategy};

    let duration_secs = samples.len() as f32 / WHISPER_SAMPLE_RATE as f32;
    tracing::debug!(samples = samples.len(), duration_secs, "Starting Whisper transcription");

    let mut state = ctx.create_state().map_err(|e| {
        PalmaError::Transcription(format!("Failed to create Whisper state: {}", e))
    })?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    let lang = if language == "auto" { None } else { Some(language) };
    params.set_language(lang);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    state
        .full(params, samples)
        .map_err(|e| PalmaError::Transcription(format!("Whisper inference failed: {}", e)))?;

    let n_segments = state.full_n_segments().map_err(|e| {
        PalmaError::Transcription(format!("Failed to get segment count: {}", e))
    })?;

    let mut text = String::new();
    for i in 0..n_segments {
        let segment = state.full_get_segment_text(i).map_err(|e| {
            PalmaError::Transcription(format!("Failed to get segment {} text: {}", i, e))
        })?;
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(segment.trim());
    }

    tracing::info!(segments = n_segments, text_len = text.len(), "Transcription complete");

    Ok(Transcript {
        text,
        language: language.to_string(),
        duration_secs,
    })
}

#[cfg(not(feature = "whisper"))]
#[async_trait]
impl TranscriptionService for WhisperService {
    async fn transcribe(&self, audio: &[f32], sample_rate: u32) -> Result<Transcript, PalmaError> {
        validate_input(audio, sample_rate)?;
        Err(PalmaError::Transcription(
            "Whisper transcription requires the `whisper` feature to be enabled".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_whisper_service_no_model_file() {
        let config = WhisperConfig {
            model_path: PathBuf::from("/nonexistent/model.bin"),
            language: "pt".to_string(),
        };
        let result = WhisperService::new(config);
        // Without the feature the stub constructs; with it the missing file fails.
        #[cfg(feature = "whisper")]
        assert!(result.is_err());
        #[cfg(not(feature = "whisper"))]
        assert_eq!(result.unwrap().config().language, "pt");
    }

    #[cfg(not(feature = "whisper"))]
    #[tokio::test]
    async fn test_whisper_service_stub_returns_error() {
        let service = WhisperService::new(WhisperConfig::default()).unwrap();
        let audio = vec![0.0f32; 16000];
        let err = service.transcribe(&audio, 16000).await.unwrap_err();
        assert!(err.to_string().contains("whisper"));
    }
}
