#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use threadline_core::models::{ConversationMessage, MessageRole, Session};
use threadline_core::repositories::InMemoryConversationRepository;
use threadline_core::services::{
    AgentBackend, AgentConfig, AgentConfigRegistry, BackendError, BackendResult,
    CreateSessionRequest, OutboundRequest, RestoreSessionRequest,
};
use threadline_core::settings::EngineSettings;
use threadline_core::{EngineParts, ThreadlineEngine};

pub const AGENT_ID: &str = "coder";

#[derive(Default)]
struct BackendState {
    created: Vec<CreateSessionRequest>,
    restored: Vec<RestoreSessionRequest>,
    sent: Vec<OutboundRequest>,
    fail_create: bool,
    fail_restore: bool,
    fail_send: Option<String>,
}

/// Backend double that records every request and fails on demand
#[derive(Default)]
pub struct ScriptedBackend {
    state: Mutex<BackendState>,
}

impl ScriptedBackend {
    pub fn fail_create(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    pub fn fail_restore(&self, fail: bool) {
        self.state.lock().fail_restore = fail;
    }

    pub fn fail_send(&self, reason: Option<&str>) {
        self.state.lock().fail_send = reason.map(str::to_string);
    }

    pub fn created(&self) -> Vec<CreateSessionRequest> {
        self.state.lock().created.clone()
    }

    pub fn restored(&self) -> Vec<RestoreSessionRequest> {
        self.state.lock().restored.clone()
    }

    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.state.lock().sent.clone()
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    async fn create_session(&self, request: CreateSessionRequest) -> BackendResult<()> {
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(BackendError::Rejected("create refused".to_string()));
        }
        state.created.push(request);
        Ok(())
    }

    async fn restore_session(&self, request: RestoreSessionRequest) -> BackendResult<()> {
        let mut state = self.state.lock();
        if state.fail_restore {
            return Err(BackendError::Status {
                status: 503,
                body: "restore unavailable".to_string(),
            });
        }
        state.restored.push(request);
        Ok(())
    }

    async fn send_message(&self, request: OutboundRequest) -> BackendResult<()> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_send.clone() {
            return Err(BackendError::Rejected(reason));
        }
        state.sent.push(request);
        Ok(())
    }
}

pub struct Harness {
    pub engine: ThreadlineEngine,
    pub repo: InMemoryConversationRepository,
    pub backend: Arc<ScriptedBackend>,
}

pub fn harness() -> Harness {
    harness_with(EngineSettings::default())
}

pub fn harness_with(settings: EngineSettings) -> Harness {
    let repo = InMemoryConversationRepository::new();
    let backend = Arc::new(ScriptedBackend::default());
    let engine = ThreadlineEngine::new(EngineParts {
        settings,
        repository: Arc::new(repo.clone()),
        backend: backend.clone(),
        agents: AgentConfigRegistry::shared(vec![AgentConfig::new(AGENT_ID, "Coder")]),
    });

    Harness {
        engine,
        repo,
        backend,
    }
}

impl Harness {
    /// Register a session in memory and in the store
    pub async fn seed_session(&self, id: &str, updated_at: i64) -> Session {
        use threadline_core::repositories::ConversationRepository;

        let session = Session::new(id, id.to_uppercase(), AGENT_ID, updated_at);
        self.repo
            .update_session(session.clone())
            .await
            .expect("seed session");
        self.engine.store().lock().add_session(session.clone());
        session
    }

    /// Write `count` messages to the store with timestamps 1000, 2000, ...
    pub async fn seed_messages(&self, session_id: &str, count: usize) -> Vec<ConversationMessage> {
        use threadline_core::repositories::ConversationRepository;

        let messages: Vec<ConversationMessage> = (1..=count)
            .map(|i| {
                let role = if i % 2 == 1 {
                    MessageRole::User
                } else {
                    MessageRole::Assistant
                };
                let mut message = ConversationMessage::new(
                    format!("{}-m{}", session_id, i),
                    session_id,
                    role,
                    i as i64 * 1000,
                );
                message.append_text(&format!("message {}", i));
                message
            })
            .collect();

        for message in &messages {
            self.repo
                .save_message(message.clone())
                .await
                .expect("seed message");
        }
        messages
    }

    pub fn messages(&self, session_id: &str) -> Vec<ConversationMessage> {
        self.engine.store().lock().messages(session_id).to_vec()
    }
}
