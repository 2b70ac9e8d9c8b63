use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::agent_backend::{
    AgentBackend, BackendError, BackendResult, CreateSessionRequest, OutboundRequest,
    RestoreSessionRequest,
};

/// [`AgentBackend`] over JSON POSTs to the agent runtime's HTTP API
#[derive(Clone)]
pub struct HttpAgentBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAgentBackend {
    pub fn new(base_url: &str) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("threadline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> BackendResult<()> {
        let url = self.url(path);
        debug!(url = %url, "POST to agent backend");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl AgentBackend for HttpAgentBackend {
    async fn create_session(&self, request: CreateSessionRequest) -> BackendResult<()> {
        self.post("/sessions", &request).await
    }

    async fn restore_session(&self, request: RestoreSessionRequest) -> BackendResult<()> {
        let path = format!("/sessions/{}/restore", request.session_id);
        self.post(&path, &request).await
    }

    async fn send_message(&self, request: OutboundRequest) -> BackendResult<()> {
        let path = format!("/sessions/{}/messages", request.session_id);
        self.post(&path, &request).await
    }
}
