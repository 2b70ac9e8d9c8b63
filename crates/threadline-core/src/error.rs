use thiserror::Error;

use crate::repositories::RepositoryError;
use crate::services::BackendError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No session is selected")]
    NoSession,

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Agent configuration not found: {0}")]
    MissingAgentConfig(String),

    #[error("Conversation history is still loading, try again shortly")]
    HistoryBusy,

    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

pub type EngineResult<T> = Result<T, EngineError>;
