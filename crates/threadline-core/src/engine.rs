use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::managers::{EventManager, MessageManager, SessionManager};
use crate::models::{ConversationsStore, ErrorStore, Session, SharedConversationsStore};
use crate::repositories::{ConversationRepository, ConversationSqliteRepository};
use crate::services::{
    AgentBackend, AgentConfig, AgentConfigRegistry, EventSource, HttpAgentBackend,
    SharedAgentConfigRegistry, init_logging,
};
use crate::settings::{EngineSettings, SettingsJsonRepository, SettingsRepository};

/// Collaborators an engine is assembled from
pub struct EngineParts {
    pub settings: EngineSettings,
    pub repository: Arc<dyn ConversationRepository>,
    pub backend: Arc<dyn AgentBackend>,
    pub agents: SharedAgentConfigRegistry,
}

/// The process-wide engine instance.
///
/// Owns the shared conversation store and the three managers. The event
/// subscription runs between `start` and `stop`.
pub struct ThreadlineEngine {
    settings: EngineSettings,
    store: SharedConversationsStore,
    agents: SharedAgentConfigRegistry,
    sessions: SessionManager,
    messages: Arc<MessageManager>,
    events: Arc<EventManager>,
    errors: Option<ErrorStore>,
}

impl ThreadlineEngine {
    pub fn new(parts: EngineParts) -> Self {
        let EngineParts {
            settings,
            repository,
            backend,
            agents,
        } = parts;

        let store = ConversationsStore::shared(&settings.dedup);
        let messages = Arc::new(MessageManager::new(
            store.clone(),
            repository.clone(),
            backend.clone(),
            agents.clone(),
            settings.initial_page_size,
            settings.load_more_page_size,
        ));
        let sessions = SessionManager::new(
            store.clone(),
            repository.clone(),
            backend,
            agents.clone(),
            messages.clone(),
        );
        let events = Arc::new(EventManager::new(store.clone(), repository));

        Self {
            settings,
            store,
            agents,
            sessions,
            messages,
            events,
            errors: None,
        }
    }

    /// Build a production engine: logging, SQLite store, HTTP backend, and
    /// the stored session list.
    pub async fn open(settings: EngineSettings, agents: Vec<AgentConfig>) -> Result<Self> {
        let errors = init_logging(&settings.log_filter);

        let db_path = settings
            .resolved_database_path()
            .context("Failed to resolve database path")?;
        let repository = ConversationSqliteRepository::open(&db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        let backend_url = settings
            .backend_url
            .clone()
            .context("backend_url is not configured")?;
        let backend =
            HttpAgentBackend::new(&backend_url).context("Failed to create backend client")?;

        let mut engine = Self::new(EngineParts {
            settings,
            repository: Arc::new(repository),
            backend: Arc::new(backend),
            agents: AgentConfigRegistry::shared(agents),
        });
        engine.errors = errors;

        let count = engine
            .sessions
            .load_sessions()
            .await
            .context("Failed to load sessions")?;
        info!(sessions = count, "Engine opened");

        Ok(engine)
    }

    /// [`open`](Self::open) with settings read from the per-user settings file
    pub async fn open_default(agents: Vec<AgentConfig>) -> Result<Self> {
        let settings = SettingsJsonRepository::new()
            .context("Failed to locate settings file")?
            .load()
            .await
            .context("Failed to load settings")?;
        Self::open(settings, agents).await
    }

    /// Subscribe to `source`; false if already subscribed
    pub fn start(&self, source: &dyn EventSource) -> bool {
        self.events.start(source)
    }

    /// Cancel the subscription and flush pending writes. `start` may be
    /// called again afterwards.
    pub async fn stop(&self) {
        self.events.stop().await;
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn messages(&self) -> &MessageManager {
        &self.messages
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn store(&self) -> &SharedConversationsStore {
        &self.store
    }

    pub fn agents(&self) -> &SharedAgentConfigRegistry {
        &self.agents
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Captured warnings and errors, when this engine installed logging
    pub fn errors(&self) -> Option<&ErrorStore> {
        self.errors.as_ref()
    }

    pub fn current_session(&self) -> Option<Session> {
        let store = self.store.lock();
        let id = store.current_id()?;
        store.get_session(id).cloned()
    }
}
