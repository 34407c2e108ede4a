use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use palma_core::{CommandOutcome, CommandRecord};
use tracing::{debug, info, warn};

use crate::audit::CommandLog;
use crate::commands::{extract_search_term, search_url, spoken_date, spoken_time, CommandHandler, CommandTable};
use crate::environment::{Application, OperatingEnvironment, VolumeChange};
use crate::error::ActionError;

const VOLUME_STEP: u8 = 10;
const DEFAULT_HOME_PAGE: &str = "https://www.google.com";

/// Result of routing one piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran and produced a reply.
    Executed { keyword: String, message: String },
    /// A handler matched but failed. Terminal: do not fall through.
    Failed { keyword: String, error: String },
    /// No keyword matched. Not an error; fall through to the assistant.
    Unrecognized,
}

impl DispatchOutcome {
    /// The text to show and speak, if any.
    pub fn reply(&self) -> Option<String> {
        match self {
            DispatchOutcome::Executed { message, .. } => Some(message.clone()),
            DispatchOutcome::Failed { keyword, error } => {
                Some(format!("Erro ao executar '{}': {}", keyword, error))
            }
            DispatchOutcome::Unrecognized => None,
        }
    }

    pub fn is_unrecognized(&self) -> bool {
        matches!(self, DispatchOutcome::Unrecognized)
    }
}

/// Routes text to local command handlers and audits every run.
pub struct CommandDispatcher {
    table: CommandTable,
    env: Arc<dyn OperatingEnvironment>,
    log: CommandLog,
    screenshot_dir: PathBuf,
}

impl CommandDispatcher {
    pub fn new(
        table: CommandTable,
        env: Arc<dyn OperatingEnvironment>,
        log: CommandLog,
        screenshot_dir: impl Into<PathBuf>,
    ) -> Self {
        for (earlier, later) in table.shadowed_rules() {
            warn!(
                earlier = %earlier.keyword,
                later = %later.keyword,
                "Command keyword is unreachable; move it before the shorter keyword it contains"
            );
        }
        Self {
            table,
            env,
            log,
            screenshot_dir: screenshot_dir.into(),
        }
    }

    /// Default table, in-memory audit log.
    pub fn with_defaults(env: Arc<dyn OperatingEnvironment>, screenshot_dir: impl Into<PathBuf>) -> Self {
        Self::new(CommandTable::default(), env, CommandLog::new(), screenshot_dir)
    }

    /// Route `text` to the first matching handler and run it.
    pub fn dispatch(&self, text: &str) -> DispatchOutcome {
        let Some(rule) = self.table.find(text) else {
            debug!(text = %text, "No command keyword matched");
            return DispatchOutcome::Unrecognized;
        };
        let keyword = rule.keyword.clone();

        match self.run(rule.handler, text) {
            Ok(message) => {
                info!(keyword = %keyword, handler = %rule.handler, "Command executed");
                self.log.append(CommandRecord::new(
                    text,
                    &keyword,
                    CommandOutcome::Success {
                        message: message.clone(),
                    },
                ));
                DispatchOutcome::Executed { keyword, message }
            }
            Err(e) => {
                warn!(keyword = %keyword, handler = %rule.handler, error = %e, "Command failed");
                let error = e.to_string();
                self.log.append(CommandRecord::new(
                    text,
                    &keyword,
                    CommandOutcome::Failure {
                        error: error.clone(),
                    },
                ));
                DispatchOutcome::Failed { keyword, error }
            }
        }
    }

    fn run(&self, handler: CommandHandler, text: &str) -> Result<String, ActionError> {
        match handler {
            CommandHandler::OpenBrowser => {
                self.env.open_url(DEFAULT_HOME_PAGE)?;
                Ok("Abrindo navegador".to_string())
            }
            CommandHandler::OpenChrome => match self.env.launch(Application::Chrome) {
                Ok(()) => Ok("Abrindo Chrome".to_string()),
                Err(e) => {
                    debug!(error = %e, "Chrome unavailable; using default browser");
                    self.env.open_url(DEFAULT_HOME_PAGE)?;
                    Ok("Abrindo navegador padrão".to_string())
                }
            },
            CommandHandler::OpenFirefox => self.launch(Application::Firefox, "Abrindo Firefox"),
            CommandHandler::OpenEdge => self.launch(Application::Edge, "Abrindo Edge"),
            CommandHandler::LaunchCalculator => {
                self.launch(Application::Calculator, "Abrindo calculadora")
            }
            CommandHandler::LaunchNotepad => {
                self.launch(Application::Notepad, "Abrindo bloco de notas")
            }
            CommandHandler::LaunchFileExplorer => {
                self.launch(Application::FileExplorer, "Abrindo explorador de arquivos")
            }
            CommandHandler::LaunchTerminal => self.launch(Application::Terminal, "Abrindo terminal"),
            CommandHandler::VolumeUp => {
                self.env.adjust_volume(VolumeChange::Up(VOLUME_STEP))?;
                Ok("Volume aumentado".to_string())
            }
            CommandHandler::VolumeDown => {
                self.env.adjust_volume(VolumeChange::Down(VOLUME_STEP))?;
                Ok("Volume diminuído".to_string())
            }
            CommandHandler::Mute => {
                self.env.adjust_volume(VolumeChange::ToggleMute)?;
                Ok("Áudio silenciado".to_string())
            }
            CommandHandler::TellTime => Ok(spoken_time(&Local::now())),
            CommandHandler::TellDate => Ok(spoken_date(Local::now().date_naive())),
            CommandHandler::Screenshot => {
                std::fs::create_dir_all(&self.screenshot_dir)?;
                let name = format!("screenshot_{}.png", Local::now().format("%Y%m%d_%H%M%S"));
                let path = self.screenshot_dir.join(&name);
                self.env.screenshot(&path)?;
                Ok(format!("Screenshot salva como {}", name))
            }
            CommandHandler::SearchWeb => {
                let term = extract_search_term(text).ok_or(ActionError::MissingSearchTerm)?;
                self.env.open_url(&search_url(&term))?;
                Ok(format!("Pesquisando por: {}", term))
            }
        }
    }

    fn launch(&self, app: Application, message: &str) -> Result<String, ActionError> {
        self.env.launch(app)?;
        Ok(message.to_string())
    }

    /// Keywords in priority order.
    pub fn available_commands(&self) -> Vec<&str> {
        self.table.keywords()
    }

    /// Audit records, oldest first.
    pub fn history(&self) -> Vec<CommandRecord> {
        self.log.records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Effect, RecordingEnvironment};

    fn dispatcher(env: Arc<RecordingEnvironment>) -> (CommandDispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let d = CommandDispatcher::with_defaults(env, dir.path());
        (d, dir)
    }

    #[test]
    fn test_calculator_command_executes_and_audits() {
        let env = Arc::new(RecordingEnvironment::new());
        let (d, _dir) = dispatcher(Arc::clone(&env));

        let outcome = d.dispatch("abrir calculadora");
        assert_eq!(
            outcome,
            DispatchOutcome::Executed {
                keyword: "abrir calculadora".to_string(),
                message: "Abrindo calculadora".to_string(),
            }
        );
        assert_eq!(env.effects(), vec![Effect::Launch(Application::Calculator)]);

        let history = d.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].raw_text, "abrir calculadora");
        assert_eq!(history[0].keyword, "abrir calculadora");
        assert!(history[0].outcome.is_success());
    }

    #[test]
    fn test_unrecognized_is_not_audited() {
        let env = Arc::new(RecordingEnvironment::new());
        let (d, _dir) = dispatcher(Arc::clone(&env));

        let outcome = d.dispatch("qual é a capital do brasil");
        assert!(outcome.is_unrecognized());
        assert_eq!(outcome.reply(), None);
        assert!(d.history().is_empty());
        assert!(env.effects().is_empty());
    }

    #[test]
    fn test_handler_failure_is_distinct_and_audited() {
        let env = Arc::new(RecordingEnvironment::with_unavailable(&[Application::Edge]));
        let (d, _dir) = dispatcher(Arc::clone(&env));

        let outcome = d.dispatch("Abrir Edge");
        match &outcome {
            DispatchOutcome::Failed { keyword, error } => {
                assert_eq!(keyword, "abrir edge");
                assert_eq!(error, "Edge não disponível neste sistema");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(
            outcome.reply().unwrap(),
            "Erro ao executar 'abrir edge': Edge não disponível neste sistema"
        );

        let history = d.history();
        assert_eq!(history.len(), 1);
        assert!(!history[0].outcome.is_success());
    }

    #[test]
    fn test_chrome_falls_back_to_default_browser() {
        let env = Arc::new(RecordingEnvironment::with_unavailable(&[Application::Chrome]));
        let (d, _dir) = dispatcher(Arc::clone(&env));

        let outcome = d.dispatch("abrir chrome");
        assert_eq!(outcome.reply().unwrap(), "Abrindo navegador padrão");
        assert_eq!(
            env.effects(),
            vec![Effect::OpenUrl("https://www.google.com".to_string())]
        );
    }

    #[test]
    fn test_search_opens_encoded_url() {
        let env = Arc::new(RecordingEnvironment::new());
        let (d, _dir) = dispatcher(Arc::clone(&env));

        let outcome = d.dispatch("Buscar previsão do tempo");
        assert_eq!(outcome.reply().unwrap(), "Pesquisando por: previsão do tempo");
        assert_eq!(
            env.effects(),
            vec![Effect::OpenUrl(
                "https://www.google.com/search?q=previs%C3%A3o+do+tempo".to_string()
            )]
        );
    }

    #[test]
    fn test_search_without_term_fails() {
        let env = Arc::new(RecordingEnvironment::new());
        let (d, _dir) = dispatcher(Arc::clone(&env));

        let outcome = d.dispatch("pesquisar");
        assert_eq!(
            outcome,
            DispatchOutcome::Failed {
                keyword: "pesquisar".to_string(),
                error: "Termo de busca não encontrado".to_string(),
            }
        );
        assert!(env.effects().is_empty());
    }

    #[test]
    fn test_volume_and_mute() {
        let env = Arc::new(RecordingEnvironment::new());
        let (d, _dir) = dispatcher(Arc::clone(&env));

        d.dispatch("aumentar volume");
        d.dispatch("diminuir volume por favor");
        d.dispatch("silenciar");
        assert_eq!(
            env.effects(),
            vec![
                Effect::Volume(VolumeChange::Up(10)),
                Effect::Volume(VolumeChange::Down(10)),
                Effect::Volume(VolumeChange::ToggleMute),
            ]
        );
    }

    #[test]
    fn test_time_and_date_replies() {
        let env = Arc::new(RecordingEnvironment::new());
        let (d, _dir) = dispatcher(env);

        let time = d.dispatch("que horas são").reply().unwrap();
        assert!(time.starts_with("São "));
        assert!(time.ends_with(" minutos"));

        let date = d.dispatch("Que dia é hoje?").reply().unwrap();
        assert!(date.starts_with("Hoje é "));
    }

    #[test]
    fn test_screenshot_goes_to_data_dir() {
        let env = Arc::new(RecordingEnvironment::new());
        let (d, dir) = dispatcher(Arc::clone(&env));

        let reply = d.dispatch("tirar screenshot").reply().unwrap();
        assert!(reply.starts_with("Screenshot salva como screenshot_"));
        match env.effects().as_slice() {
            [Effect::Screenshot(path)] => {
                assert_eq!(path.parent().unwrap(), dir.path());
                assert_eq!(path.extension().unwrap(), "png");
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn test_audit_file_receives_failures_too() {
        let dir = tempfile::tempdir().unwrap();
        let audit = dir.path().join("commands.jsonl");
        let env = Arc::new(RecordingEnvironment::with_unavailable(&[Application::Terminal]));
        let d = CommandDispatcher::new(
            CommandTable::default(),
            env,
            CommandLog::with_file(&audit),
            dir.path(),
        );

        d.dispatch("abrir terminal");
        d.dispatch("abrir firefox");
        d.dispatch("bom dia");

        let lines = std::fs::read_to_string(&audit).unwrap();
        let statuses: Vec<String> = lines
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["outcome"]["status"]
                .as_str()
                .unwrap()
                .to_string())
            .collect();
        assert_eq!(statuses, vec!["failure", "success"]);
    }

    #[test]
    fn test_available_commands_in_priority_order() {
        let env = Arc::new(RecordingEnvironment::new());
        let (d, _dir) = dispatcher(env);
        let commands = d.available_commands();
        assert_eq!(commands.first(), Some(&"abrir navegador"));
        assert!(commands.iter().position(|c| *c == "pesquisar") < commands.iter().position(|c| *c == "buscar"));
    }
}
