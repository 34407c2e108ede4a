use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PalmaError, Result};

/// Top-level configuration for the Palma assistant.
///
/// Loaded from `~/.palma/config.toml` by default. Each section corresponds
/// to one collaborator or coordinator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PalmaConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

impl PalmaConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PalmaConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PalmaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for captured audio, screenshots, history and audit log.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.palma/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Hand-tracking collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Hands reported per frame. Only single-hand mode is supported.
    pub max_num_hands: u8,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// Primary loop frequency in frames per second.
    pub frame_rate: u32,
    /// Whether frames are mirrored before detection (selfie view), which
    /// flips the reported hand side.
    pub mirrored: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_num_hands: 1,
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.5,
            frame_rate: 30,
            mirrored: true,
        }
    }
}

/// Voice capture and transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Whisper model size: "tiny", "base", "small".
    pub whisper_model: String,
    /// Path to the GGML model file. Empty resolves to
    /// `<data_dir>/models/ggml-<whisper_model>.bin`.
    pub model_path: String,
    /// Language hint passed to the transcriber.
    pub language: String,
    pub sample_rate: u32,
    /// Fixed capture window in seconds.
    pub record_secs: u32,
    /// First value of the visible countdown.
    pub countdown_from: u8,
    pub countdown_tick_ms: u64,
    /// Pause after the listening prompt finishes playing.
    pub grace_ms: u64,
    /// Keep captured audio under `<data_dir>/audio` for audit.
    pub save_audio: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            whisper_model: "base".to_string(),
            model_path: String::new(),
            language: "pt".to_string(),
            sample_rate: 16_000,
            record_secs: 5,
            countdown_from: 3,
            countdown_tick_ms: 1000,
            grace_ms: 1000,
            save_audio: true,
        }
    }
}

/// Speech-output collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// Words per minute.
    pub rate: u32,
    /// Playback volume (0.0 to 1.0).
    pub volume: f32,
    /// TTS program to run. Empty picks `say` on macOS and `espeak` elsewhere.
    pub program: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 150,
            volume: 0.9,
            program: String::new(),
        }
    }
}

/// Conversational AI backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// "ollama", "openai" or "groq".
    pub provider: String,
    /// Empty selects the provider default.
    pub model: String,
    /// Empty selects the provider default.
    pub base_url: String,
    pub temperature: f32,
    /// Reply-length hint.
    pub max_tokens: u32,
    pub system_prompt: String,
    /// Conversation history file, relative to the data dir.
    pub history_file: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: String::new(),
            base_url: String::new(),
            temperature: 0.7,
            max_tokens: 150,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_file: "conversation_history.json".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Fixed reply policy sent ahead of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Você é um assistente virtual pessoal prestativo e amigável.
Responda em português brasileiro de forma concisa e clara.
Se não souber algo, admita honestamente.
Mantenha respostas curtas (máximo 2-3 frases) para facilitar a leitura.";

/// Local command settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Append every executed command to `<data_dir>/commands.jsonl`.
    pub audit_log: bool,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self { audit_log: true }
    }
}
