//! Conversation proxy: history bookkeeping around a chat backend.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use palma_core::config::DEFAULT_SYSTEM_PROMPT;
use palma_core::{ConversationTurn, Role};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::ChatBackend;
use crate::error::ChatError;

/// Reply when no backend could be configured.
pub const UNAVAILABLE_REPLY: &str = "IA não disponível. Verifique a configuração.";

/// Reply when the backend call fails.
pub const APOLOGY_REPLY: &str = "Desculpe, ocorreu um erro ao processar sua mensagem.";

/// Ordered user/assistant turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    fn replace(&mut self, turns: Vec<ConversationTurn>) {
        self.turns = turns;
    }
}

/// Persisted form of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationExport {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub conversation: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub provider: String,
    pub model: String,
    pub message_count: usize,
}

/// Sends unrecognized text to the conversational backend.
///
/// Built without a backend when none could be configured; `chat` then
/// answers with a fixed notice and records nothing.
pub struct ConversationProxy {
    backend: Option<Arc<dyn ChatBackend>>,
    system_prompt: String,
    history: Mutex<ConversationHistory>,
}

impl ConversationProxy {
    pub fn new(backend: Arc<dyn ChatBackend>, system_prompt: impl Into<String>) -> Self {
        Self {
            backend: Some(backend),
            system_prompt: system_prompt.into(),
            history: Mutex::new(ConversationHistory::new()),
        }
    }

    /// Proxy with no backend.
    pub fn unavailable() -> Self {
        Self {
            backend: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history: Mutex::new(ConversationHistory::new()),
        }
    }

    /// Use `backend` if it could be built, otherwise degrade to unavailable.
    pub fn from_backend(
        backend: Result<Arc<dyn ChatBackend>, ChatError>,
        system_prompt: impl Into<String>,
    ) -> Self {
        match backend {
            Ok(backend) => Self::new(backend, system_prompt),
            Err(e) => {
                warn!(error = %e, "Conversational assistant disabled");
                Self {
                    system_prompt: system_prompt.into(),
                    ..Self::unavailable()
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConversationHistory> {
        self.history.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Send `text` and return the reply to show the user.
    ///
    /// The user turn is recorded before the call. On failure it stays
    /// recorded with no assistant turn after it.
    pub async fn chat(&self, text: &str) -> String {
        let Some(backend) = &self.backend else {
            return UNAVAILABLE_REPLY.to_string();
        };

        let messages = {
            let mut history = self.lock();
            history.push(ConversationTurn::user(text));
            let mut messages = Vec::with_capacity(history.len() + 1);
            messages.push(ConversationTurn {
                role: Role::System,
                text: self.system_prompt.clone(),
            });
            messages.extend(history.turns().iter().cloned());
            messages
        };

        debug!(turns = messages.len() - 1, "Calling chat backend");
        match backend.complete(&messages).await {
            Ok(reply) => {
                self.lock().push(ConversationTurn::assistant(reply.clone()));
                reply
            }
            Err(e) => {
                warn!(provider = backend.provider(), error = %e, "Chat backend failed");
                APOLOGY_REPLY.to_string()
            }
        }
    }

    pub fn reset(&self) {
        self.lock().clear();
        info!("Conversation history cleared");
    }

    /// Snapshot of the turns, oldest first.
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.lock().turns().to_vec()
    }

    pub fn message_count(&self) -> usize {
        self.lock().len()
    }

    fn provider_id(&self) -> String {
        self.backend
            .as_ref()
            .map(|b| b.provider().to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    fn model_id(&self) -> String {
        self.backend
            .as_ref()
            .map(|b| b.model().to_string())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            provider: self.provider_id(),
            model: self.model_id(),
            message_count: self.message_count(),
        }
    }

    pub fn export(&self) -> ConversationExport {
        ConversationExport {
            timestamp: Utc::now(),
            provider: self.provider_id(),
            model: self.model_id(),
            conversation: self.history(),
        }
    }

    /// Replace the history with the exported turns. The system policy is
    /// fixed, so a document carrying a system turn is rejected whole and the
    /// history is left unchanged. Returns the number of turns imported.
    pub fn import(&self, export: ConversationExport) -> Result<usize, ChatError> {
        if let Some((index, turn)) = export
            .conversation
            .iter()
            .enumerate()
            .find(|(_, t)| !matches!(t.role, Role::User | Role::Assistant))
        {
            return Err(ChatError::InvalidTurn {
                index,
                role: turn.role,
            });
        }
        let count = export.conversation.len();
        self.lock().replace(export.conversation);
        debug!(turns = count, "Conversation history imported");
        Ok(count)
    }

    pub fn save(&self, path: &Path) -> Result<(), ChatError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.export())?;
        std::fs::write(path, content)?;
        info!(path = %path.display(), "Conversation history saved");
        Ok(())
    }

    /// Load a saved conversation. On any error the history is unchanged.
    /// Returns the number of turns loaded.
    pub fn load(&self, path: &Path) -> Result<usize, ChatError> {
        let content = std::fs::read_to_string(path)?;
        let export: ConversationExport = serde_json::from_str(&content)?;
        let count = self.import(export)?;
        info!(path = %path.display(), turns = count, "Conversation history loaded");
        Ok(count)
    }
}
