use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::conversation_repository::{
    BoxFuture, ConversationRepository, MessageOrder, MessageQuery,
};
use super::error::{RepositoryError, RepositoryResult};
use crate::models::{ConversationMessage, Session};

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    messages: HashMap<String, ConversationMessage>,
    batches: Vec<Vec<ConversationMessage>>,
    saves: usize,
    fail_writes: bool,
    read_delay: Option<Duration>,
}

/// In-memory conversation store.
///
/// Useful for tests and development. Records every batch write and can be
/// told to fail writes or to delay reads.
#[derive(Clone, Default)]
pub struct InMemoryConversationRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Delay every `get_messages` call
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.inner.lock().read_delay = delay;
    }

    /// Batches passed to `save_message_batch`, in call order
    pub fn batches(&self) -> Vec<Vec<ConversationMessage>> {
        self.inner.lock().batches.clone()
    }

    /// Number of successful single-message saves
    pub fn save_count(&self) -> usize {
        self.inner.lock().saves
    }

    pub fn stored_message(&self, id: &str) -> Option<ConversationMessage> {
        self.inner.lock().messages.get(id).cloned()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().messages.len()
    }

    fn check_writable(inner: &Inner) -> RepositoryResult<()> {
        if inner.fail_writes {
            return Err(RepositoryError::IoError(std::io::Error::other(
                "simulated write failure",
            )));
        }
        Ok(())
    }
}

impl ConversationRepository for InMemoryConversationRepository {
    fn get_messages(
        &self,
        session_id: &str,
        query: MessageQuery,
    ) -> BoxFuture<'static, RepositoryResult<Vec<ConversationMessage>>> {
        let inner = self.inner.clone();
        let session_id = session_id.to_string();

        Box::pin(async move {
            let delay = inner.lock().read_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let store = inner.lock();
            let mut result: Vec<ConversationMessage> = store
                .messages
                .values()
                .filter(|m| m.session_id == session_id)
                .filter(|m| query.before.is_none_or(|cursor| m.created_at < cursor))
                .cloned()
                .collect();

            result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            if query.order == MessageOrder::NewestFirst {
                result.reverse();
            }
            result.truncate(query.limit);

            Ok(result)
        })
    }

    fn save_message(
        &self,
        message: ConversationMessage,
    ) -> BoxFuture<'static, RepositoryResult<()>> {
        let inner = self.inner.clone();

        Box::pin(async move {
            let mut store = inner.lock();
            Self::check_writable(&store)?;
            store.saves += 1;
            store.messages.insert(message.id.clone(), message);
            Ok(())
        })
    }

    fn save_message_batch(
        &self,
        messages: Vec<ConversationMessage>,
    ) -> BoxFuture<'static, RepositoryResult<()>> {
        let inner = self.inner.clone();

        Box::pin(async move {
            let mut store = inner.lock();
            Self::check_writable(&store)?;
            store.batches.push(messages.clone());
            for message in messages {
                store.messages.insert(message.id.clone(), message);
            }
            Ok(())
        })
    }

    fn delete_message(
        &self,
        session_id: &str,
        id: &str,
    ) -> BoxFuture<'static, RepositoryResult<()>> {
        let inner = self.inner.clone();
        let session_id = session_id.to_string();
        let id = id.to_string();

        Box::pin(async move {
            let mut store = inner.lock();
            Self::check_writable(&store)?;
            if store
                .messages
                .get(&id)
                .is_some_and(|m| m.session_id == session_id)
            {
                store.messages.remove(&id);
            }
            Ok(())
        })
    }

    fn get_session(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<Session>>> {
        let inner = self.inner.clone();
        let id = id.to_string();

        Box::pin(async move { Ok(inner.lock().sessions.get(&id).cloned()) })
    }

    fn list_sessions(&self) -> BoxFuture<'static, RepositoryResult<Vec<Session>>> {
        let inner = self.inner.clone();

        Box::pin(async move {
            let mut result: Vec<Session> = inner.lock().sessions.values().cloned().collect();
            result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(result)
        })
    }

    fn update_session(&self, session: Session) -> BoxFuture<'static, RepositoryResult<()>> {
        let inner = self.inner.clone();

        Box::pin(async move {
            let mut store = inner.lock();
            Self::check_writable(&store)?;
            store.sessions.insert(session.id.clone(), session);
            Ok(())
        })
    }

    fn delete_session(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let inner = self.inner.clone();
        let id = id.to_string();

        Box::pin(async move {
            let mut store = inner.lock();
            Self::check_writable(&store)?;
            store.sessions.remove(&id);
            store.messages.retain(|_, m| m.session_id != id);
            Ok(())
        })
    }
}
