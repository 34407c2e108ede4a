//! Error types for command handlers.
//!
//! Handler errors are read back to the user, so their messages are in
//! Portuguese.

use palma_core::PalmaError;

/// Errors from running a command handler.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("{0} não disponível neste sistema")]
    Unavailable(String),
    #[error("falha ao executar {program}: {reason}")]
    LaunchFailed { program: String, reason: String },
    #[error("Termo de busca não encontrado")]
    MissingSearchTerm,
    #[error("erro de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ActionError> for PalmaError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Io(e) => PalmaError::Io(e),
            other => PalmaError::Command(other.to_string()),
        }
    }
}
