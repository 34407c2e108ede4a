//! CLI argument definitions for the Palma application.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use palma_core::config::expand_home;
use palma_core::PalmaConfig;
use std::path::PathBuf;

/// Palma - a hands-free voice assistant driven by hand gestures.
#[derive(Parser, Debug)]
#[command(name = "palma", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for audio, screenshots, history and the audit log.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Conversational backend: ollama, openai or groq.
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// Model name for the conversational backend.
    #[arg(long = "model")]
    pub model: Option<String>,

    /// Print replies instead of speaking them.
    #[arg(long = "no-speech")]
    pub no_speech: bool,

    /// JSON-lines recording of hand-tracker output. Reads stdin when omitted.
    #[arg(short = 'r', long = "replay")]
    pub replay: Option<PathBuf>,
}

impl CliArgs {
    /// Priority: --config flag > PALMA_CONFIG env var > ~/.palma/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(|var| std::env::var(var).ok())
    }

    fn resolve_config_path_with(&self, env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env("PALMA_CONFIG") {
            return PathBuf::from(p);
        }
        expand_home("~/.palma/config.toml")
    }

    /// Apply flag and env overrides to a loaded config.
    pub fn apply(&self, config: &mut PalmaConfig) {
        self.apply_with(config, |var| std::env::var(var).ok())
    }

    fn apply_with(&self, config: &mut PalmaConfig, env: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = self
            .data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .or_else(|| env("PALMA_DATA_DIR"))
        {
            config.general.data_dir = dir;
        }
        if let Some(level) = self.log_level.clone() {
            config.general.log_level = level;
        }
        if let Some(provider) = self.provider.clone().or_else(|| env("PALMA_PROVIDER")) {
            config.assistant.provider = provider;
        }
        if let Some(model) = self.model.clone().or_else(|| env("PALMA_MODEL")) {
            config.assistant.model = model;
        }
        if self.no_speech {
            config.speech.enabled = false;
        }
    }
}
