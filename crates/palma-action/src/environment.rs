//! Operating-environment collaborator.
//!
//! Each method is one synchronous external effect. `SystemEnvironment`
//! shells out to the platform's own tools; `RecordingEnvironment` only
//! records what it was asked to do.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::ActionError;

/// Applications the command table can launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Application {
    Chrome,
    Firefox,
    Edge,
    Calculator,
    Notepad,
    FileExplorer,
    Terminal,
}

impl Application {
    /// Name used in user-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Application::Chrome => "Chrome",
            Application::Firefox => "Firefox",
            Application::Edge => "Edge",
            Application::Calculator => "Calculadora",
            Application::Notepad => "Bloco de notas",
            Application::FileExplorer => "Explorador",
            Application::Terminal => "Terminal",
        }
    }
}

/// Relative volume adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChange {
    /// Raise by a percentage of full scale.
    Up(u8),
    /// Lower by a percentage of full scale.
    Down(u8),
    ToggleMute,
}

/// External effects available to command handlers.
pub trait OperatingEnvironment: Send + Sync {
    fn launch(&self, app: Application) -> Result<(), ActionError>;

    /// Open `url` in the default browser.
    fn open_url(&self, url: &str) -> Result<(), ActionError>;

    fn adjust_volume(&self, change: VolumeChange) -> Result<(), ActionError>;

    /// Capture the screen to a PNG at `path`.
    fn screenshot(&self, path: &Path) -> Result<(), ActionError>;
}

// =============================================================================
// Platform implementation
// =============================================================================

/// Runs the platform's own launchers and utilities.
#[derive(Debug, Default, Clone)]
pub struct SystemEnvironment;

impl SystemEnvironment {
    pub fn new() -> Self {
        Self
    }

    /// Start a program and leave it running.
    fn spawn(program: &str, args: &[&str]) -> Result<(), ActionError> {
        debug!(program, ?args, "Spawning");
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| ActionError::LaunchFailed {
                program: program.to_string(),
                reason: e.to_string(),
            })
    }

    /// Run a short-lived utility to completion.
    #[cfg_attr(target_os = "windows", allow(dead_code))]
    fn run(program: &str, args: &[&str]) -> Result<(), ActionError> {
        debug!(program, ?args, "Running");
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| ActionError::LaunchFailed {
                program: program.to_string(),
                reason: e.to_string(),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ActionError::LaunchFailed {
                program: program.to_string(),
                reason: status.to_string(),
            })
        }
    }

    fn home_dir() -> PathBuf {
        let var = if cfg!(target_os = "windows") {
            "USERPROFILE"
        } else {
            "HOME"
        };
        std::env::var_os(var)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(target_os = "windows")]
impl OperatingEnvironment for SystemEnvironment {
    fn launch(&self, app: Application) -> Result<(), ActionError> {
        match app {
            Application::Chrome => Self::spawn("cmd", &["/C", "start", "", "chrome"]),
            Application::Firefox => Self::spawn("cmd", &["/C", "start", "", "firefox"]),
            Application::Edge => Self::spawn("cmd", &["/C", "start", "", "msedge"]),
            Application::Calculator => Self::spawn("calc.exe", &[]),
            Application::Notepad => Self::spawn("notepad.exe", &[]),
            Application::FileExplorer => {
                let home = Self::home_dir();
                Self::spawn("explorer.exe", &[&home.to_string_lossy()])
            }
            Application::Terminal => Self::spawn("cmd", &["/C", "start", "", "cmd"]),
        }
    }

    fn open_url(&self, url: &str) -> Result<(), ActionError> {
        info!(url, "Opening URL");
        Self::spawn("cmd", &["/C", "start", "", url])
    }

    fn adjust_volume(&self, _change: VolumeChange) -> Result<(), ActionError> {
        Err(ActionError::Unavailable("Controle de volume".to_string()))
    }

    fn screenshot(&self, _path: &Path) -> Result<(), ActionError> {
        Err(ActionError::Unavailable("Captura de tela".to_string()))
    }
}

#[cfg(target_os = "macos")]
impl OperatingEnvironment for SystemEnvironment {
    fn launch(&self, app: Application) -> Result<(), ActionError> {
        match app {
            Application::Chrome => Self::spawn("open", &["-a", "Google Chrome"]),
            Application::Firefox => Self::spawn("open", &["-a", "Firefox"]),
            Application::Edge => Self::spawn("open", &["-a", "Microsoft Edge"]),
            Application::Calculator => Self::spawn("open", &["-a", "Calculator"]),
            Application::Notepad => Self::spawn("open", &["-a", "TextEdit"]),
            Application::FileExplorer => {
                let home = Self::home_dir();
                Self::spawn("open", &[&home.to_string_lossy()])
            }
            Application::Terminal => Self::spawn("open", &["-a", "Terminal"]),
        }
    }

    fn open_url(&self, url: &str) -> Result<(), ActionError> {
        info!(url, "Opening URL");
        Self::spawn("open", &[url])
    }

    fn adjust_volume(&self, change: VolumeChange) -> Result<(), ActionError> {
        let script = match change {
            VolumeChange::Up(step) => format!(
                "set volume output volume ((output volume of (get volume settings)) + {})",
                step
            ),
            VolumeChange::Down(step) => format!(
                "set volume output volume ((output volume of (get volume settings)) - {})",
                step
            ),
            VolumeChange::ToggleMute => {
                "set volume output muted not (output muted of (get volume settings))".to_string()
            }
        };
        Self::run("osascript", &["-e", &script])
    }

    fn screenshot(&self, path: &Path) -> Result<(), ActionError> {
        Self::run("screencapture", &["-x", &path.to_string_lossy()])
    }
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
impl OperatingEnvironment for SystemEnvironment {
    fn launch(&self, app: Application) -> Result<(), ActionError> {
        match app {
            Application::Chrome => Self::spawn("google-chrome", &[]),
            Application::Firefox => Self::spawn("firefox", &[]),
            Application::Edge => Self::spawn("microsoft-edge", &[])
                .map_err(|_| ActionError::Unavailable("Edge".to_string())),
            Application::Calculator => Self::spawn("gnome-calculator", &[]),
            Application::Notepad => Self::spawn("gedit", &[]),
            Application::FileExplorer => {
                let home = Self::home_dir();
                Self::spawn("xdg-open", &[&home.to_string_lossy()])
            }
            Application::Terminal => Self::spawn("x-terminal-emulator", &[]),
        }
    }

    fn open_url(&self, url: &str) -> Result<(), ActionError> {
        info!(url, "Opening URL");
        Self::spawn("xdg-open", &[url])
    }

    fn adjust_volume(&self, change: VolumeChange) -> Result<(), ActionError> {
        match change {
            VolumeChange::Up(step) => Self::run(
                "pactl",
                &["set-sink-volume", "@DEFAULT_SINK@", &format!("+{}%", step)],
            ),
            VolumeChange::Down(step) => Self::run(
                "pactl",
                &["set-sink-volume", "@DEFAULT_SINK@", &format!("-{}%", step)],
            ),
            VolumeChange::ToggleMute => {
                Self::run("pactl", &["set-sink-mute", "@DEFAULT_SINK@", "toggle"])
            }
        }
    }

    fn screenshot(&self, path: &Path) -> Result<(), ActionError> {
        Self::run("gnome-screenshot", &["-f", &path.to_string_lossy()])
    }
}

// =============================================================================
// Recording implementation
// =============================================================================

/// One effect requested from a `RecordingEnvironment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Launch(Application),
    OpenUrl(String),
    Volume(VolumeChange),
    Screenshot(PathBuf),
}

/// Records requested effects without touching the system.
///
/// Applications listed as unavailable fail to launch, for exercising the
/// failure paths.
#[derive(Debug, Default)]
pub struct RecordingEnvironment {
    effects: Mutex<Vec<Effect>>,
    unavailable: Vec<Application>,
}

impl RecordingEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unavailable(apps: &[Application]) -> Self {
        Self {
            effects: Mutex::new(Vec::new()),
            unavailable: apps.to_vec(),
        }
    }

    pub fn effects(&self) -> Vec<Effect> {
        self.effects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn record(&self, effect: Effect) {
        self.effects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(effect);
    }
}

impl OperatingEnvironment for RecordingEnvironment {
    fn launch(&self, app: Application) -> Result<(), ActionError> {
        if self.unavailable.contains(&app) {
            return Err(ActionError::Unavailable(app.display_name().to_string()));
        }
        self.record(Effect::Launch(app));
        Ok(())
    }

    fn open_url(&self, url: &str) -> Result<(), ActionError> {
        self.record(Effect::OpenUrl(url.to_string()));
        Ok(())
    }

    fn adjust_volume(&self, change: VolumeChange) -> Result<(), ActionError> {
        self.record(Effect::Volume(change));
        Ok(())
    }

    fn screenshot(&self, path: &Path) -> Result<(), ActionError> {
        self.record(Effect::Screenshot(path.to_path_buf()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_environment_records_in_order() {
        let env = RecordingEnvironment::new();
        env.launch(Application::Calculator).unwrap();
        env.adjust_volume(VolumeChange::Up(10)).unwrap();
        env.open_url("https://www.google.com").unwrap();

        assert_eq!(
            env.effects(),
            vec![
                Effect::Launch(Application::Calculator),
                Effect::Volume(VolumeChange::Up(10)),
                Effect::OpenUrl("https://www.google.com".to_string()),
            ]
        );
    }

    #[test]
    fn test_unavailable_application_fails_without_recording() {
        let env = RecordingEnvironment::with_unavailable(&[Application::Edge]);
        let err = env.launch(Application::Edge).unwrap_err();
        assert_eq!(err.to_string(), "Edge não disponível neste sistema");
        assert!(env.effects().is_empty());
    }

    #[test]
    fn test_missing_program_is_launch_failure() {
        let err = SystemEnvironment::spawn("/nonexistent/palma-app", &[]).unwrap_err();
        assert!(matches!(err, ActionError::LaunchFailed { .. }));
    }
}
