//! The keyword table and the fixed set of command handlers.

use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Timelike};
use regex::Regex;

/// Every effect a voice command can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandHandler {
    OpenBrowser,
    OpenChrome,
    OpenFirefox,
    OpenEdge,
    LaunchCalculator,
    LaunchNotepad,
    LaunchFileExplorer,
    LaunchTerminal,
    VolumeUp,
    VolumeDown,
    Mute,
    TellTime,
    TellDate,
    Screenshot,
    SearchWeb,
}

impl fmt::Display for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One `(keyword, handler)` entry. Keywords are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRule {
    pub keyword: String,
    pub handler: CommandHandler,
}

impl CommandRule {
    pub fn new(keyword: &str, handler: CommandHandler) -> Self {
        Self {
            keyword: keyword.trim().to_lowercase(),
            handler,
        }
    }
}

/// Priority-ordered keyword table. The first keyword found in the input wins,
/// so longer phrases must precede any shorter keyword they contain.
#[derive(Debug, Clone)]
pub struct CommandTable {
    rules: Vec<CommandRule>,
}

impl Default for CommandTable {
    fn default() -> Self {
        use CommandHandler::*;
        Self::new(vec![
            CommandRule::new("abrir navegador", OpenBrowser),
            CommandRule::new("abrir chrome", OpenChrome),
            CommandRule::new("abrir firefox", OpenFirefox),
            CommandRule::new("abrir edge", OpenEdge),
            CommandRule::new("abrir calculadora", LaunchCalculator),
            CommandRule::new("abrir bloco de notas", LaunchNotepad),
            CommandRule::new("abrir explorador", LaunchFileExplorer),
            CommandRule::new("abrir terminal", LaunchTerminal),
            CommandRule::new("aumentar volume", VolumeUp),
            CommandRule::new("diminuir volume", VolumeDown),
            CommandRule::new("silenciar", Mute),
            CommandRule::new("que horas são", TellTime),
            CommandRule::new("que dia é hoje", TellDate),
            CommandRule::new("tirar screenshot", Screenshot),
            CommandRule::new("pesquisar", SearchWeb),
            CommandRule::new("buscar", SearchWeb),
            CommandRule::new("procurar", SearchWeb),
        ])
    }
}

impl CommandTable {
    pub fn new(rules: Vec<CommandRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CommandRule] {
        &self.rules
    }

    /// First rule whose keyword occurs in `text`, ignoring case and
    /// surrounding whitespace.
    pub fn find(&self, text: &str) -> Option<&CommandRule> {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| !rule.keyword.is_empty() && normalized.contains(&rule.keyword))
    }

    /// Pairs `(earlier, later)` where the earlier keyword is contained in the
    /// later one, making the later rule unreachable.
    pub fn shadowed_rules(&self) -> Vec<(&CommandRule, &CommandRule)> {
        let mut shadowed = Vec::new();
        for (i, later) in self.rules.iter().enumerate() {
            if let Some(earlier) = self.rules[..i]
                .iter()
                .find(|earlier| later.keyword.contains(&earlier.keyword))
            {
                shadowed.push((earlier, later));
            }
        }
        shadowed
    }

    /// Keywords in priority order.
    pub fn keywords(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.keyword.as_str()).collect()
    }
}

// =============================================================================
// Spoken replies
// =============================================================================

const WEEKDAYS: [&str; 7] = [
    "segunda", "terça", "quarta", "quinta", "sexta", "sábado", "domingo",
];

const MONTHS: [&str; 12] = [
    "janeiro", "fevereiro", "março", "abril", "maio", "junho", "julho", "agosto", "setembro",
    "outubro", "novembro", "dezembro",
];

/// "São 14 horas e 5 minutos"
pub fn spoken_time(time: &impl Timelike) -> String {
    format!("São {} horas e {} minutos", time.hour(), time.minute())
}

/// "Hoje é sexta, 3 de maio"
pub fn spoken_date(date: NaiveDate) -> String {
    let weekday = WEEKDAYS[date.weekday().num_days_from_monday() as usize];
    let month = MONTHS[date.month0() as usize];
    format!("Hoje é {}, {} de {}", weekday, date.day(), month)
}

static SEARCH_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:pesquisar|buscar|procurar)(.*)$").expect("Invalid search-term regex")
});

/// The text after the first search verb, trimmed. `None` if nothing follows.
pub fn extract_search_term(text: &str) -> Option<String> {
    let lower = text.trim().to_lowercase();
    let term = SEARCH_TERM
        .captures(&lower)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())?;
    (!term.is_empty()).then_some(term)
}

/// Google search URL with spaces as `+` and everything else percent-encoded.
pub fn search_url(term: &str) -> String {
    let query = term
        .split_whitespace()
        .map(|word| urlencoding::encode(word).into_owned())
        .collect::<Vec<_>>()
        .join("+");
    format!("https://www.google.com/search?q={}", query)
}
