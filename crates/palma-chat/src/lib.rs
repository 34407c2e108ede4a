//! Palma Chat crate - Conversational assistant fallback.
//!
//! Text that no local command recognizes is sent here. The proxy keeps the
//! conversation history, prepends a fixed system policy, and calls a chat
//! backend (a local Ollama server or an OpenAI-compatible API).

pub mod backend;
pub mod error;
pub mod proxy;

pub use backend::{
    build_backend, ChatBackend, CompletionSettings, MockBackend, OllamaBackend,
    OpenAiCompatibleBackend, Provider,
};
pub use error::ChatError;
pub use proxy::{
    ConversationExport, ConversationHistory, ConversationProxy, ConversationSummary, APOLOGY_REPLY,
    UNAVAILABLE_REPLY,
};
