//! Outbound calls to the agent runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::agent_registry::AgentConfig;
use crate::models::ConversationMessage;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request rejected: {0}")]
    Rejected(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub session_id: String,
    pub agent_config_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// Re-attach backend context to an existing session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestoreSessionRequest {
    pub session_id: String,
    pub agent: AgentConfig,
}

/// One user turn plus the context the backend needs to answer it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub session_id: String,
    /// Prior messages, oldest first, never including `message`
    pub history: Vec<ConversationMessage>,
    pub message: ConversationMessage,
    pub agent: AgentConfig,
}

#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn create_session(&self, request: CreateSessionRequest) -> BackendResult<()>;

    async fn restore_session(&self, request: RestoreSessionRequest) -> BackendResult<()>;

    async fn send_message(&self, request: OutboundRequest) -> BackendResult<()>;
}
