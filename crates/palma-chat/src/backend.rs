//! Chat backends.
//!
//! A backend takes the full message list (system policy first, then the
//! conversation) and returns the assistant's reply text.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use palma_core::config::AssistantConfig;
use palma_core::ConversationTurn;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::ChatError;

/// Sampling settings sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 150,
        }
    }
}

impl From<&AssistantConfig> for CompletionSettings {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// A conversational model behind some transport.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Provider id, e.g. "ollama".
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    async fn complete(&self, messages: &[ConversationTurn]) -> Result<String, ChatError>;
}

// =============================================================================
// Provider selection
// =============================================================================

/// Supported chat providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
    Groq,
}

impl Provider {
    pub fn id(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Ollama => "llama3.2:3b",
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Groq => "llama-3.1-8b-instant",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
        }
    }

    /// Environment variable holding the API key, if the provider needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::Ollama => None,
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
        }
    }
}

impl FromStr for Provider {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAi),
            "groq" => Ok(Provider::Groq),
            other => Err(ChatError::UnknownProvider(other.to_string())),
        }
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value.trim()
    }
}

/// Build the backend named by `config`, reading API keys from the environment.
pub fn build_backend(config: &AssistantConfig) -> Result<Arc<dyn ChatBackend>, ChatError> {
    build_backend_with(config, |var| std::env::var(var).ok())
}

fn build_backend_with(
    config: &AssistantConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn ChatBackend>, ChatError> {
    let provider: Provider = config.provider.parse()?;
    let model = non_empty_or(&config.model, provider.default_model()).to_string();
    let base_url = non_empty_or(&config.base_url, provider.default_base_url()).to_string();
    let settings = CompletionSettings::from(config);
    let timeout = Duration::from_secs(config.timeout_secs.max(1));

    let backend: Arc<dyn ChatBackend> = match provider.api_key_env() {
        None => Arc::new(OllamaBackend::new(base_url, model, settings, timeout)?),
        Some(var) => {
            let api_key = lookup(var)
                .filter(|k| !k.trim().is_empty())
                .ok_or(ChatError::MissingApiKey(var))?;
            Arc::new(OpenAiCompatibleBackend::new(
                provider, base_url, api_key, model, settings, timeout,
            )?)
        }
    };
    info!(
        provider = backend.provider(),
        model = backend.model(),
        "Chat backend configured"
    );
    Ok(backend)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ChatError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ChatError::Unavailable(format!("failed to create HTTP client: {}", e)))
}

fn wire_messages(messages: &[ConversationTurn]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| json!({ "role": m.role.to_string(), "content": m.text }))
        .collect()
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ChatError::Status {
        status: status.as_u16(),
        message,
    })
}

fn non_empty_reply(text: String) -> Result<String, ChatError> {
    let text = text.trim().to_string();
    if text.is_empty() {
        Err(ChatError::EmptyReply)
    } else {
        Ok(text)
    }
}

// =============================================================================
// Ollama
// =============================================================================

/// Local Ollama server, `/api/chat` without streaming.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    settings: CompletionSettings,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

impl OllamaBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        settings: CompletionSettings,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            settings,
        })
    }

    fn request_body(&self, messages: &[ConversationTurn]) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": wire_messages(messages),
            "stream": false,
            "options": {
                "temperature": self.settings.temperature,
                "num_predict": self.settings.max_tokens,
            },
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn provider(&self) -> &str {
        Provider::Ollama.id()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ConversationTurn]) -> Result<String, ChatError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(url = %url, messages = messages.len(), "Sending chat request");
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(messages))
            .send()
            .await?;
        let body: OllamaResponse = error_for_status(response).await?.json().await?;
        non_empty_reply(body.message.content)
    }
}

// =============================================================================
// OpenAI-compatible (OpenAI, Groq)
// =============================================================================

/// Any `/chat/completions` endpoint with bearer-token auth.
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    provider: Provider,
    base_url: String,
    api_key: String,
    model: String,
    settings: CompletionSettings,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: OllamaMessage,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        provider: Provider,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        settings: CompletionSettings,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        Ok(Self {
            client: http_client(timeout)?,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            settings,
        })
    }

    fn request_body(&self, messages: &[ConversationTurn]) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": wire_messages(messages),
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    fn provider(&self) -> &str {
        self.provider.id()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ConversationTurn]) -> Result<String, ChatError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, messages = messages.len(), "Sending chat request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages))
            .send()
            .await?;
        let body: CompletionResponse = error_for_status(response).await?.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ChatError::EmptyReply)?;
        non_empty_reply(content)
    }
}

// =============================================================================
// Mock
// =============================================================================

/// Scripted backend for tests.
///
/// Replies are taken from the script in order; once it runs out, the fallback
/// reply is used. Every request's message list is recorded.
pub struct MockBackend {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Result<String, String>,
    delay: Duration,
    requests: Mutex<Vec<Vec<ConversationTurn>>>,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::with_fallback(Ok(reply.into()))
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_fallback(Err(reason.into()))
    }

    fn with_fallback(fallback: Result<String, String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Simulated latency per request, in tokio time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue one reply ahead of the fallback.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(Ok(reply.into()));
    }

    /// Queue one failure ahead of the fallback.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(Err(reason.into()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Message lists received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<ConversationTurn>> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, messages: &[ConversationTurn]) -> Result<String, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(messages.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(ChatError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palma_core::Role;

    fn assistant_config(provider: &str) -> AssistantConfig {
        AssistantConfig {
            provider: provider.to_string(),
            ..AssistantConfig::default()
        }
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("Ollama".parse::<Provider>().unwrap(), Provider::Ollama);
        assert_eq!(" groq ".parse::<Provider>().unwrap(), Provider::Groq);
        let err = "claude".parse::<Provider>().unwrap_err();
        assert!(matches!(err, ChatError::UnknownProvider(p) if p == "claude"));
    }

    #[test]
    fn test_build_ollama_uses_defaults() {
        let backend = build_backend_with(&assistant_config("ollama"), |_| None).unwrap();
        assert_eq!(backend.provider(), "ollama");
        assert_eq!(backend.model(), "llama3.2:3b");
    }

    #[test]
    fn test_build_openai_requires_key() {
        let err = build_backend_with(&assistant_config("openai"), |_| None)
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::MissingApiKey("OPENAI_API_KEY")));

        let err = build_backend_with(&assistant_config("groq"), |_| Some("  ".to_string()))
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::MissingApiKey("GROQ_API_KEY")));
    }

    #[test]
    fn test_build_groq_with_key_and_custom_model() {
        let config = AssistantConfig {
            provider: "groq".to_string(),
            model: "mixtral".to_string(),
            ..AssistantConfig::default()
        };
        let backend = build_backend_with(&config, |var| {
            (var == "GROQ_API_KEY").then(|| "gsk-test".to_string())
        })
        .unwrap();
        assert_eq!(backend.provider(), "groq");
        assert_eq!(backend.model(), "mixtral");
    }

    #[test]
    fn test_ollama_request_body() {
        let backend = OllamaBackend::new(
            "http://localhost:11434/",
            "llama3.2:3b",
            CompletionSettings {
                temperature: 0.5,
                max_tokens: 99,
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434");

        let body = backend.request_body(&[ConversationTurn::user("olá")]);
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 99);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "olá");
    }

    #[test]
    fn test_openai_request_body() {
        let backend = OpenAiCompatibleBackend::new(
            Provider::OpenAi,
            Provider::OpenAi.default_base_url(),
            "sk-test",
            "gpt-4o-mini",
            CompletionSettings::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        let system = ConversationTurn {
            role: Role::System,
            text: "seja breve".to_string(),
        };
        let body = backend.request_body(&[system, ConversationTurn::user("oi")]);
        assert_eq!(body["max_tokens"], 150);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "oi");
    }

    #[test]
    fn test_completion_response_parsing() {
        let raw = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Olá!"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Olá!");

        let raw = r#"{"model":"llama3.2:3b","message":{"role":"assistant","content":"Oi"},"done":true}"#;
        let parsed: OllamaResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content, "Oi");
    }

    #[test]
    fn test_blank_reply_is_an_error() {
        assert!(matches!(non_empty_reply("  ".to_string()), Err(ChatError::EmptyReply)));
        assert_eq!(non_empty_reply(" Oi ".to_string()).unwrap(), "Oi");
    }

    #[tokio::test]
    async fn test_mock_backend_script_then_fallback() {
        let backend = MockBackend::replying("padrão");
        backend.push_failure("offline");
        backend.push_reply("primeira");

        let turns = [ConversationTurn::user("oi")];
        assert!(backend.complete(&turns).await.is_err());
        assert_eq!(backend.complete(&turns).await.unwrap(), "primeira");
        assert_eq!(backend.complete(&turns).await.unwrap(), "padrão");
        assert_eq!(backend.call_count(), 3);
        assert_eq!(backend.requests().len(), 3);
    }
}
