//! Palma application binary - composition root.
//!
//! 1. Load configuration from TOML and apply CLI/env overrides
//! 2. Build the collaborators (speech, recorder, commands, assistant)
//! 3. Load the voice model in the background
//! 4. Feed hand-tracker frames through the interaction engine at the
//!    configured frame rate until the tracker ends or Ctrl-C arrives
//! 5. Persist the conversation history

mod cli;
mod console;

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use cli::CliArgs;
use palma_action::{CommandDispatcher, CommandLog, CommandTable, SystemEnvironment};
use palma_audio::{AudioArchive, AudioRecorder, SilentSpeech, SpeechOutput, SystemSpeech};
use palma_chat::{build_backend, ConversationProxy};
use palma_core::config::expand_home;
use palma_core::{EventBus, PalmaConfig, PalmaEvent};
use palma_gesture::{Frame, HandTracker, ReplayTracker};
use palma_interaction::{CaptureSettings, InteractionEngine, VoiceCaptureCoordinator};
use palma_whisper::WhisperConfig;

/// Upper bound on waiting for an in-flight cycle once the tracker ends.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
}

#[cfg(feature = "microphone")]
fn build_recorder(sample_rate: u32) -> Arc<dyn AudioRecorder> {
    match palma_audio::CpalRecorder::new(sample_rate) {
        Ok(recorder) => Arc::new(recorder),
        Err(e) => {
            tracing::warn!(error = %e, "No usable microphone; recording silence");
            Arc::new(palma_audio::MockRecorder::new(sample_rate))
        }
    }
}

#[cfg(not(feature = "microphone"))]
fn build_recorder(sample_rate: u32) -> Arc<dyn AudioRecorder> {
    tracing::warn!("Built without the `microphone` feature; recording silence");
    Arc::new(palma_audio::MockRecorder::new(sample_rate))
}

/// Load the transcription model off the primary loop and report the outcome.
#[cfg(feature = "whisper")]
async fn load_voice_model(config: WhisperConfig, capture: Arc<VoiceCaptureCoordinator>, events: EventBus) {
    use palma_whisper::WhisperService;

    let loaded = tokio::task::spawn_blocking(move || WhisperService::new(config)).await;
    let ready = match loaded {
        Ok(Ok(service)) => capture.install_transcriber(Arc::new(service)),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Voice model failed to load");
            capture.mark_unavailable();
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "Voice model loader panicked");
            capture.mark_unavailable();
            false
        }
    };
    events.publish(PalmaEvent::VoiceModelStatus {
        ready,
        timestamp: chrono::Utc::now(),
    });
}

#[cfg(not(feature = "whisper"))]
async fn load_voice_model(config: WhisperConfig, capture: Arc<VoiceCaptureCoordinator>, events: EventBus) {
    tracing::warn!(
        model = %config.model_path.display(),
        "Built without the `whisper` feature; voice commands are disabled"
    );
    capture.mark_unavailable();
    events.publish(PalmaEvent::VoiceModelStatus {
        ready: false,
        timestamp: chrono::Utc::now(),
    });
}

fn open_tracker(replay: Option<&Path>, config: &PalmaConfig) -> palma_core::Result<ReplayTracker> {
    match replay {
        Some(path) => ReplayTracker::open(path, &config.tracking),
        None => Ok(ReplayTracker::new(
            BufReader::new(std::io::stdin()),
            &config.tracking,
        )),
    }
}

/// Poll the tracker on its own thread. The channel holds one frame so the
/// source is paced by the primary loop.
fn spawn_tracker(mut tracker: impl HandTracker + 'static) -> mpsc::Receiver<Frame> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || loop {
        let frame = match tracker.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Tracker frame dropped");
                Frame::Empty
            }
        };
        let done = frame == Frame::EndOfStream;
        if tx.blocking_send(frame).is_err() || done {
            break;
        }
    });
    rx
}

fn save_history(proxy: &ConversationProxy, path: &Path) {
    if proxy.message_count() == 0 {
        return;
    }
    match proxy.save(path) {
        Ok(()) => tracing::info!(path = %path.display(), "Conversation saved"),
        Err(e) => tracing::warn!(error = %e, "Failed to save conversation"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_path = args.resolve_config_path();
    let mut config = PalmaConfig::load_or_default(&config_path);
    args.apply(&mut config);

    init_tracing(&config.general.log_level);
    tracing::info!(config = %config_path.display(), "Palma starting");

    let data_dir: PathBuf = expand_home(&config.general.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let events = EventBus::new();
    tokio::spawn(console::render(events.subscribe()));

    let speech: Arc<dyn SpeechOutput> = if config.speech.enabled {
        Arc::new(SystemSpeech::new(&config.speech))
    } else {
        Arc::new(SilentSpeech)
    };

    let log = if config.commands.audit_log {
        CommandLog::with_file(data_dir.join("commands.jsonl"))
    } else {
        CommandLog::new()
    };
    let dispatcher = Arc::new(CommandDispatcher::new(
        CommandTable::default(),
        Arc::new(SystemEnvironment::new()),
        log,
        data_dir.join("screenshots"),
    ));

    let proxy = Arc::new(ConversationProxy::from_backend(
        build_backend(&config.assistant),
        config.assistant.system_prompt.clone(),
    ));
    let history_path = data_dir.join(&config.assistant.history_file);
    if history_path.exists() {
        match proxy.load(&history_path) {
            Ok(turns) => tracing::info!(turns, "Conversation restored"),
            Err(e) => tracing::warn!(error = %e, "Ignoring unreadable conversation history"),
        }
    }

    let mut coordinator = VoiceCaptureCoordinator::new(
        speech.clone(),
        build_recorder(config.voice.sample_rate),
        CaptureSettings::from(&config.voice),
    );
    if config.voice.save_audio {
        coordinator = coordinator.with_archive(AudioArchive::new(data_dir.join("audio")));
    }
    let capture = Arc::new(coordinator);

    tokio::spawn(load_voice_model(
        WhisperConfig::from_voice(&config.voice, &data_dir),
        capture.clone(),
        events.clone(),
    ));

    let mut engine = InteractionEngine::new(
        speech,
        dispatcher,
        proxy.clone(),
        capture,
        events.clone(),
    );

    let tracker = open_tracker(args.replay.as_deref(), &config)?;
    let mut frames = spawn_tracker(tracker);

    let frame_rate = config.tracking.frame_rate.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(1) / frame_rate);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(frame_rate, "Primary loop started");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                match frames.try_recv() {
                    Ok(Frame::EndOfStream) | Err(TryRecvError::Disconnected) => {
                        tracing::info!("Tracker finished");
                        if tokio::time::timeout(SHUTDOWN_GRACE, engine.settle()).await.is_err() {
                            tracing::warn!("Cycle still running at shutdown");
                        }
                        break;
                    }
                    Ok(frame) => {
                        engine.observe(frame.observation());
                    }
                    // No new frame this tick.
                    Err(TryRecvError::Empty) => {}
                }
                engine.pump();
            }
        }
    }

    save_history(&proxy, &history_path);
    tracing::info!(state = %engine.state(), "Palma stopped");
    Ok(())
}
