use std::future::Future;
use std::pin::Pin;

use super::error::RepositoryResult;
use crate::models::{ConversationMessage, Session};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Page request against a session's stored messages
#[derive(Clone, Debug, PartialEq)]
pub struct MessageQuery {
    pub limit: usize,
    pub order: MessageOrder,
    /// Only messages with `created_at` strictly below this cursor
    pub before: Option<i64>,
}

impl MessageQuery {
    pub fn newest(limit: usize) -> Self {
        Self {
            limit,
            order: MessageOrder::NewestFirst,
            before: None,
        }
    }

    pub fn before(mut self, cursor: Option<i64>) -> Self {
        self.before = cursor;
        self
    }

    /// Every stored message, oldest first
    pub fn all() -> Self {
        Self {
            limit: usize::MAX,
            order: MessageOrder::OldestFirst,
            before: None,
        }
    }
}

/// Durable store for sessions and their messages.
///
/// Every operation is an independent future with its own failure domain.
pub trait ConversationRepository: Send + Sync + 'static {
    fn get_messages(
        &self,
        session_id: &str,
        query: MessageQuery,
    ) -> BoxFuture<'static, RepositoryResult<Vec<ConversationMessage>>>;

    /// Insert or replace a message by id
    fn save_message(&self, message: ConversationMessage)
    -> BoxFuture<'static, RepositoryResult<()>>;

    /// Insert or replace several messages in one write
    fn save_message_batch(
        &self,
        messages: Vec<ConversationMessage>,
    ) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Remove one message; a missing id is not an error
    fn delete_message(
        &self,
        session_id: &str,
        id: &str,
    ) -> BoxFuture<'static, RepositoryResult<()>>;

    fn get_session(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<Session>>>;

    /// All stored sessions, most recently updated first
    fn list_sessions(&self) -> BoxFuture<'static, RepositoryResult<Vec<Session>>>;

    /// Insert or replace a session
    fn update_session(&self, session: Session) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Delete a session and all of its messages
    fn delete_session(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>>;
}
