//! Speech-output collaborator.
//!
//! `speak` never blocks the caller: playback runs on a background task and
//! `is_speaking` reports whether any utterance is still in flight. The
//! in-flight count is a counter rather than a flag so overlapping
//! utterances cannot clear each other.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use palma_core::config::SpeechConfig;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AudioError;

/// Plays text back to the user.
pub trait SpeechOutput: Send + Sync {
    /// Queue `text` for playback and return immediately.
    fn speak(&self, text: &str);

    /// True while any queued utterance has not finished playing.
    fn is_speaking(&self) -> bool;
}

/// Decrements the in-flight counter when dropped, so a failed or panicked
/// playback task still reports idle.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// System TTS program
// =============================================================================

/// Speaks through an external TTS program (`espeak`, `say`).
///
/// Utterances are played one at a time in the order they were queued.
pub struct SystemSpeech {
    program: String,
    rate: u32,
    volume: f32,
    in_flight: Arc<AtomicUsize>,
    turn: Arc<tokio::sync::Mutex<()>>,
}

impl SystemSpeech {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            program: resolve_program(&config.program),
            rate: config.rate,
            volume: config.volume.clamp(0.0, 1.0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            turn: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command-line arguments for one utterance.
    fn args(&self, text: &str) -> Vec<String> {
        if is_say(&self.program) {
            vec!["-r".to_string(), self.rate.to_string(), text.to_string()]
        } else {
            // espeak amplitude runs 0..=200, 100 being normal.
            let amplitude = (self.volume * 200.0).round() as u32;
            vec![
                "-v".to_string(),
                "pt-br".to_string(),
                "-s".to_string(),
                self.rate.to_string(),
                "-a".to_string(),
                amplitude.to_string(),
                text.to_string(),
            ]
        }
    }
}

fn is_say(program: &str) -> bool {
    program == "say" || program.ends_with("/say")
}

fn resolve_program(configured: &str) -> String {
    if !configured.trim().is_empty() {
        return configured.trim().to_string();
    }
    if cfg!(target_os = "macos") {
        "say".to_string()
    } else {
        "espeak".to_string()
    }
}

async fn play(program: &str, args: &[String]) -> Result<(), AudioError> {
    let status = Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map_err(|e| AudioError::Speech(format!("failed to run {}: {}", program, e)))?;
    if !status.success() {
        return Err(AudioError::Speech(format!("{} exited with {}", program, status)));
    }
    Ok(())
}

impl SpeechOutput for SystemSpeech {
    fn speak(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let guard = InFlight::enter(&self.in_flight);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available; dropping utterance");
            return;
        };

        let program = self.program.clone();
        let args = self.args(text);
        let turn = Arc::clone(&self.turn);
        debug!(program = %program, chars = text.len(), "Queueing utterance");

        handle.spawn(async move {
            let _guard = guard;
            let _turn = turn.lock().await;
            if let Err(e) = play(&program, &args).await {
                warn!(error = %e, "Speech output failed");
            }
        });
    }

    fn is_speaking(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

// =============================================================================
// Silent and mock outputs
// =============================================================================

/// Used when speech output is disabled. Text is logged, never played.
#[derive(Debug, Default, Clone)]
pub struct SilentSpeech;

impl SpeechOutput for SilentSpeech {
    fn speak(&self, text: &str) {
        debug!(text = %text, "Speech disabled; not speaking");
    }

    fn is_speaking(&self) -> bool {
        false
    }
}

/// Records utterances and simulates playback time.
///
/// Each utterance keeps `is_speaking` true for `duration` of tokio time.
#[derive(Debug, Clone)]
pub struct MockSpeech {
    spoken: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    duration: Duration,
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl MockSpeech {
    pub fn new(duration: Duration) -> Self {
        Self {
            spoken: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            duration,
        }
    }

    /// Everything spoken so far, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.spoken.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

impl SpeechOutput for MockSpeech {
    fn speak(&self, text: &str) {
        self.spoken
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(text.to_string());

        if self.duration.is_zero() {
            return;
        }
        let guard = InFlight::enter(&self.in_flight);
        let duration = self.duration;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _guard = guard;
                tokio::time::sleep(duration).await;
            });
        }
    }

    fn is_speaking(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}
