use std::sync::Arc;

use tracing::{debug, info, warn};

use super::message_manager::MessageManager;
use crate::error::{EngineError, EngineResult};
use crate::models::{Session, SessionOverrides, SharedConversationsStore, now_millis};
use crate::repositories::ConversationRepository;
use crate::services::{
    AgentBackend, CreateSessionRequest, RestoreSessionRequest, SharedAgentConfigRegistry,
};

/// Session lifecycle and the session metadata registry
pub struct SessionManager {
    store: SharedConversationsStore,
    repository: Arc<dyn ConversationRepository>,
    backend: Arc<dyn AgentBackend>,
    agents: SharedAgentConfigRegistry,
    messages: Arc<MessageManager>,
}

impl SessionManager {
    pub fn new(
        store: SharedConversationsStore,
        repository: Arc<dyn ConversationRepository>,
        backend: Arc<dyn AgentBackend>,
        agents: SharedAgentConfigRegistry,
        messages: Arc<MessageManager>,
    ) -> Self {
        Self {
            store,
            repository,
            backend,
            agents,
            messages,
        }
    }

    /// Create a session on the backend and locally, and make it current
    pub async fn create_session(
        &self,
        agent_config_id: &str,
        display_name: &str,
        overrides: SessionOverrides,
    ) -> EngineResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(&id, display_name, agent_config_id, now_millis())
            .with_overrides(overrides);

        self.backend
            .create_session(CreateSessionRequest {
                session_id: id.clone(),
                agent_config_id: agent_config_id.to_string(),
                display_name: display_name.to_string(),
                cwd: session.cwd.clone(),
            })
            .await?;

        self.repository.update_session(session.clone()).await?;

        {
            let mut store = self.store.lock();
            store.add_session(session);
            store.set_current(&id);
        }

        self.restore_backend_session(&id, agent_config_id, true)
            .await;

        info!(session_id = %id, agent = %agent_config_id, "Created session");
        Ok(id)
    }

    /// Delete from the durable store, then from memory
    pub async fn delete_session(&self, id: &str) -> EngineResult<()> {
        self.repository.delete_session(id).await?;

        let mut store = self.store.lock();
        store.remove_session(id);
        info!(session_id = %id, current = ?store.current_id(), "Deleted session");
        Ok(())
    }

    pub fn set_current_session(&self, id: &str) -> EngineResult<()> {
        if self.store.lock().set_current(id) {
            Ok(())
        } else {
            Err(EngineError::UnknownSession(id.to_string()))
        }
    }

    /// Hydrate a session and its newest page of messages from the store,
    /// then re-attach its backend context
    pub async fn load_session_from_store(&self, id: &str) -> EngineResult<Session> {
        let session = self
            .repository
            .get_session(id)
            .await?
            .ok_or_else(|| EngineError::UnknownSession(id.to_string()))?;

        self.store.lock().add_session(session.clone());
        self.messages
            .load_initial_messages_for_session(id, None)
            .await?;

        self.restore_backend_session(id, &session.agent_config_id, false)
            .await;

        Ok(session)
    }

    /// Re-attach backend context to a session. Returns whether it happened.
    ///
    /// Brand-new sessions are skipped: their context travels with the first
    /// outbound message. Failures are logged and left for a later retry.
    pub async fn restore_backend_session(
        &self,
        id: &str,
        agent_config_id: &str,
        is_new_session: bool,
    ) -> bool {
        if is_new_session {
            debug!(session_id = %id, "Skipping backend restore for new session");
            return false;
        }

        let Some(agent) = self.agents.read().resolve(agent_config_id).cloned() else {
            warn!(session_id = %id, agent = %agent_config_id, "Cannot restore session without agent configuration");
            return false;
        };

        match self
            .backend
            .restore_session(RestoreSessionRequest {
                session_id: id.to_string(),
                agent,
            })
            .await
        {
            Ok(()) => {
                debug!(session_id = %id, "Restored backend session");
                true
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Backend session restore failed");
                false
            }
        }
    }

    /// Load every stored session into the registry, most recent first.
    /// Returns how many were loaded.
    pub async fn load_sessions(&self) -> EngineResult<usize> {
        let sessions = self.repository.list_sessions().await?;
        let count = sessions.len();

        let mut store = self.store.lock();
        for session in sessions {
            store.add_session(session);
        }
        info!(count, current = ?store.current_id(), "Loaded sessions");
        Ok(count)
    }

    pub async fn rename_session(&self, id: &str, display_name: &str) -> EngineResult<Session> {
        self.update_metadata(id, |s| s.display_name = display_name.to_string())
            .await
    }

    pub async fn set_session_cwd(&self, id: &str, cwd: Option<String>) -> EngineResult<Session> {
        self.update_metadata(id, |s| s.cwd = cwd).await
    }

    pub async fn archive_session(&self, id: &str, archived: bool) -> EngineResult<Session> {
        self.update_metadata(id, |s| s.archived = archived).await
    }

    /// Apply `update` in memory first, then write the session through
    async fn update_metadata(
        &self,
        id: &str,
        update: impl FnOnce(&mut Session),
    ) -> EngineResult<Session> {
        let session = {
            let mut store = self.store.lock();
            let session = store
                .get_session_mut(id)
                .ok_or_else(|| EngineError::UnknownSession(id.to_string()))?;
            update(session);
            session.touch(now_millis());
            session.clone()
        };

        self.repository.update_session(session.clone()).await?;
        Ok(session)
    }
}
