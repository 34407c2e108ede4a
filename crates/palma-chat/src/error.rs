//! Error types for the conversational assistant.

use palma_core::PalmaError;

/// Errors from the chat backend and history persistence.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("assistant unavailable: {0}")]
    Unavailable(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("backend returned an empty reply")]
    EmptyReply,
    #[error("history file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history format error: {0}")]
    Format(#[from] serde_json::Error),
    #[error("history turn {index} has role {role}; only user and assistant turns are kept")]
    InvalidTurn { index: usize, role: palma_core::Role },
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Backend(err.to_string())
    }
}

impl From<ChatError> for PalmaError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Unavailable(_) | ChatError::UnknownProvider(_) | ChatError::MissingApiKey(_) => {
                PalmaError::Config(err.to_string())
            }
            ChatError::Io(e) => PalmaError::Io(e),
            ChatError::Format(e) => PalmaError::Serialization(e.to_string()),
            ChatError::InvalidTurn { .. } => PalmaError::Serialization(err.to_string()),
            other => PalmaError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(
            ChatError::Unavailable("no backend".to_string()).to_string(),
            "assistant unavailable: no backend"
        );
        assert_eq!(
            ChatError::MissingApiKey("GROQ_API_KEY").to_string(),
            "missing API key: set GROQ_API_KEY"
        );
        assert_eq!(
            ChatError::Status {
                status: 429,
                message: "slow down".to_string()
            }
            .to_string(),
            "backend returned status 429: slow down"
        );
        assert_eq!(ChatError::EmptyReply.to_string(), "backend returned an empty reply");
    }

    #[test]
    fn test_chat_error_into_palma_error() {
        let err: PalmaError = ChatError::UnknownProvider("claude".to_string()).into();
        assert!(matches!(err, PalmaError::Config(_)));

        let err: PalmaError = ChatError::Backend("timeout".to_string()).into();
        assert!(matches!(err, PalmaError::Backend(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PalmaError = ChatError::from(json_err).into();
        assert!(matches!(err, PalmaError::Serialization(_)));

        let err: PalmaError = ChatError::InvalidTurn {
            index: 0,
            role: palma_core::Role::System,
        }
        .into();
        assert!(matches!(err, PalmaError::Serialization(ref m) if m.contains("role system")));
    }
}
