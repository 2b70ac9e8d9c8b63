use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::{
    ConversationMessage, HistoryStatus, PaginationState, SharedConversationsStore, now_millis,
};
use crate::repositories::{ConversationRepository, MessageQuery};
use crate::services::{AgentBackend, OutboundRequest, SharedAgentConfigRegistry};

#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    /// Target session; the current session when `None`
    pub session_id: Option<String>,
}

impl SendOptions {
    pub fn to_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
        }
    }
}

/// Outbound submission and paginated history loading
pub struct MessageManager {
    store: SharedConversationsStore,
    repository: Arc<dyn ConversationRepository>,
    backend: Arc<dyn AgentBackend>,
    agents: SharedAgentConfigRegistry,
    initial_page_size: usize,
    load_more_page_size: usize,
}

impl MessageManager {
    pub fn new(
        store: SharedConversationsStore,
        repository: Arc<dyn ConversationRepository>,
        backend: Arc<dyn AgentBackend>,
        agents: SharedAgentConfigRegistry,
        initial_page_size: usize,
        load_more_page_size: usize,
    ) -> Self {
        Self {
            store,
            repository,
            backend,
            agents,
            initial_page_size: initial_page_size.max(1),
            load_more_page_size: load_more_page_size.max(1),
        }
    }

    /// Submit a user message.
    ///
    /// The message is visible in the session before any I/O starts. Every
    /// failure after that point leaves it in place with status `Error` and
    /// the cause recorded, and is also returned.
    pub async fn send_message(
        &self,
        content: &str,
        options: SendOptions,
    ) -> EngineResult<ConversationMessage> {
        let (message, agent_config_id) = {
            let mut store = self.store.lock();
            let session_id = match options.session_id {
                Some(id) => id,
                None => store
                    .current_id()
                    .map(str::to_string)
                    .ok_or(EngineError::NoSession)?,
            };
            let agent_config_id = store
                .get_session(&session_id)
                .map(|s| s.agent_config_id.clone())
                .ok_or_else(|| EngineError::UnknownSession(session_id.clone()))?;

            let now = now_millis();
            let chat = store
                .chat_mut(&session_id)
                .ok_or_else(|| EngineError::UnknownSession(session_id.clone()))?;
            let created_at = chat
                .last_timestamp()
                .map(|last| now.max(last + 1))
                .unwrap_or(now);
            let message = ConversationMessage::user(&session_id, content, created_at);
            chat.messages.push(message.clone());
            store.touch_session(&session_id, now);

            (message, agent_config_id)
        };

        debug!(session_id = %message.session_id, message_id = %message.id, "Inserted outgoing message");

        if let Err(e) = self.repository.save_message(message.clone()).await {
            warn!(error = ?e, message_id = %message.id, "Failed to save outgoing message");
            self.mark_failed(&message, &e.to_string());
            return Err(e.into());
        }

        match self.dispatch(&message, &agent_config_id).await {
            Ok(()) => {
                let sent = self.update_message(&message, |m| m.mark_sent());
                if let Some(sent) = &sent
                    && let Some(chat) = self.store.lock().chat_mut(&sent.session_id)
                {
                    chat.full_history.append(sent.clone());
                }
                let sent = sent.unwrap_or_else(|| {
                    let mut fallback = message.clone();
                    fallback.mark_sent();
                    fallback
                });
                self.persist_status(sent.clone()).await;
                info!(session_id = %sent.session_id, message_id = %sent.id, "Message sent");
                Ok(sent)
            }
            Err(e) => {
                warn!(error = %e, message_id = %message.id, "Failed to send message");
                if let Some(failed) = self.mark_failed(&message, &e.to_string()) {
                    self.persist_status(failed).await;
                }
                Err(e)
            }
        }
    }

    async fn dispatch(&self, message: &ConversationMessage, agent_config_id: &str) -> EngineResult<()> {
        let agent = self
            .agents
            .read()
            .resolve(agent_config_id)
            .cloned()
            .ok_or_else(|| EngineError::MissingAgentConfig(agent_config_id.to_string()))?;

        let history = self
            .ensure_full_history(&message.session_id)
            .await?
            .into_iter()
            .filter(|m| m.id != message.id)
            .collect();

        self.backend
            .send_message(OutboundRequest {
                session_id: message.session_id.clone(),
                history,
                message: message.clone(),
                agent,
            })
            .await?;

        Ok(())
    }

    /// Complete history for outbound context, oldest first.
    ///
    /// Fetches the buffer when idle and refuses to race a fetch already in
    /// flight. The loaded buffer is overlaid with the visible list so merged
    /// replies that arrived after the fetch are included.
    async fn ensure_full_history(&self, session_id: &str) -> EngineResult<Vec<ConversationMessage>> {
        let status = {
            let mut store = self.store.lock();
            let history = &mut store
                .chat_mut(session_id)
                .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?
                .full_history;
            match history.status() {
                HistoryStatus::Loading => return Err(EngineError::HistoryBusy),
                HistoryStatus::Idle => {
                    history.begin_loading();
                    HistoryStatus::Idle
                }
                HistoryStatus::Loaded => HistoryStatus::Loaded,
            }
        };

        if status == HistoryStatus::Idle {
            debug!(session_id = %session_id, "Fetching full history");
            let fetched = self
                .repository
                .get_messages(session_id, MessageQuery::all())
                .await;

            let mut store = self.store.lock();
            let chat = store
                .chat_mut(session_id)
                .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?;
            match fetched {
                Ok(messages) => chat.full_history.finish_loading(messages),
                Err(e) => {
                    chat.full_history.reset();
                    return Err(e.into());
                }
            }
        }

        let store = self.store.lock();
        let Some(chat) = store.chat(session_id) else {
            return Ok(Vec::new());
        };

        let mut by_id: HashMap<&str, &ConversationMessage> = HashMap::new();
        for message in chat.full_history.messages().iter().chain(chat.messages.iter()) {
            by_id.insert(message.id.as_str(), message);
        }
        let mut history: Vec<ConversationMessage> = by_id.into_values().cloned().collect();
        history.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(history)
    }

    /// Replace the visible list with the newest page from the store
    pub async fn load_initial_messages_for_session(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> EngineResult<usize> {
        let limit = limit.unwrap_or(self.initial_page_size).max(1);
        let mut messages = self
            .repository
            .get_messages(session_id, MessageQuery::newest(limit))
            .await?;
        messages.reverse();

        let count = messages.len();
        let mut store = self.store.lock();
        let chat = store
            .chat_mut(session_id)
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?;
        chat.pagination = PaginationState {
            has_more: count == limit,
            is_loading_more: false,
            total_loaded: count,
            last_loaded_timestamp: messages.first().map(|m| m.created_at),
        };
        chat.messages = messages;
        chat.full_history.reset();

        debug!(session_id = %session_id, count, "Loaded initial messages");
        Ok(count)
    }

    /// Prepend the next older page. Returns how many messages were added;
    /// zero without I/O when a load is in flight or nothing older exists.
    pub async fn load_more_messages_for_session(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> EngineResult<usize> {
        let limit = limit.unwrap_or(self.load_more_page_size).max(1);

        let cursor = {
            let mut store = self.store.lock();
            let pagination = &mut store
                .chat_mut(session_id)
                .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?
                .pagination;
            if pagination.is_loading_more || !pagination.has_more {
                return Ok(0);
            }
            pagination.is_loading_more = true;
            pagination.last_loaded_timestamp
        };

        let fetched = self
            .repository
            .get_messages(session_id, MessageQuery::newest(limit).before(cursor))
            .await;

        let mut store = self.store.lock();
        let Some(chat) = store.chat_mut(session_id) else {
            debug!(session_id = %session_id, "Session removed while loading older messages");
            return Ok(0);
        };
        chat.pagination.is_loading_more = false;

        let mut older = fetched?;
        let fetched_count = older.len();
        // The cursor follows every fetched row, including ones already
        // visible, so the next page always starts strictly older
        if let Some(oldest) = older.last() {
            chat.pagination.last_loaded_timestamp = Some(
                chat.pagination
                    .last_loaded_timestamp
                    .map_or(oldest.created_at, |cursor| cursor.min(oldest.created_at)),
            );
        }
        older.reverse();
        older.retain(|m| !chat.contains(&m.id));

        let added = older.len();
        chat.pagination.total_loaded += added;
        chat.pagination.has_more = fetched_count == limit;
        older.append(&mut chat.messages);
        chat.messages = older;

        debug!(session_id = %session_id, added, has_more = chat.pagination.has_more, "Loaded older messages");
        Ok(added)
    }

    /// Mark every visible assistant message read; returns how many changed
    pub fn mark_session_read(&self, session_id: &str) -> usize {
        let mut store = self.store.lock();
        let Some(chat) = store.chat_mut(session_id) else {
            return 0;
        };
        let mut changed = 0;
        for message in chat.messages.iter_mut().filter(|m| m.is_assistant() && !m.read) {
            message.read = true;
            changed += 1;
        }
        changed
    }

    fn update_message(
        &self,
        message: &ConversationMessage,
        update: impl FnOnce(&mut ConversationMessage),
    ) -> Option<ConversationMessage> {
        let mut store = self.store.lock();
        let target = store.message_mut(&message.session_id, &message.id)?;
        update(target);
        Some(target.clone())
    }

    fn mark_failed(&self, message: &ConversationMessage, cause: &str) -> Option<ConversationMessage> {
        self.update_message(message, |m| m.mark_error(cause))
    }

    async fn persist_status(&self, message: ConversationMessage) {
        if let Err(e) = self.repository.save_message(message).await {
            warn!(error = ?e, "Failed to persist message status");
        }
    }
}
