use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::dedup_registry::DedupRegistry;
use super::event::AgentEvent;
use super::message::ConversationMessage;
use super::session::Session;
use super::session_chat::SessionChat;
use crate::settings::DedupSettings;

/// Store shared by every manager. Locks are never held across an `.await`.
pub type SharedConversationsStore = Arc<Mutex<ConversationsStore>>;

/// Process-wide conversation state: session registry, per-session chats,
/// the current session and the dedup registry.
pub struct ConversationsStore {
    sessions: HashMap<String, Session>,
    chats: HashMap<String, SessionChat>,
    current_session_id: Option<String>,
    dedup: DedupRegistry,
}

impl ConversationsStore {
    pub fn new(dedup: &DedupSettings) -> Self {
        Self {
            sessions: HashMap::new(),
            chats: HashMap::new(),
            current_session_id: None,
            dedup: DedupRegistry::new(dedup),
        }
    }

    pub fn shared(dedup: &DedupSettings) -> SharedConversationsStore {
        Arc::new(Mutex::new(Self::new(dedup)))
    }

    /// Add or replace a session. Becomes current if none is set.
    pub fn add_session(&mut self, session: Session) {
        let id = session.id.clone();
        self.sessions.insert(id.clone(), session);
        self.chats.entry(id.clone()).or_default();

        if self.current_session_id.is_none() {
            self.current_session_id = Some(id);
        }
    }

    pub fn get_session(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove a session and its messages. Reassigns the current session to
    /// the most recently updated remaining one.
    pub fn remove_session(&mut self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        self.chats.remove(id);

        if self.current_session_id.as_deref() == Some(id) {
            self.current_session_id = self.list_all().first().map(|s| s.id.clone());
        }

        removed
    }

    /// Set the current session; fails for unknown ids
    pub fn set_current(&mut self, id: &str) -> bool {
        if self.sessions.contains_key(id) {
            self.current_session_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_session_id.as_deref()
    }

    /// All sessions, most recently updated first
    pub fn list_all(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.updated_at));
        sessions
    }

    pub fn list_recent(&self, limit: usize) -> Vec<&Session> {
        let mut sessions = self.list_all();
        sessions.truncate(limit);
        sessions
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn chat(&self, session_id: &str) -> Option<&SessionChat> {
        self.chats.get(session_id)
    }

    /// Chat of a registered session. Chats only exist alongside their
    /// session, so late work for a removed session finds nothing here.
    pub fn chat_mut(&mut self, session_id: &str) -> Option<&mut SessionChat> {
        self.chats.get_mut(session_id)
    }

    pub fn messages(&self, session_id: &str) -> &[ConversationMessage] {
        self.chats
            .get(session_id)
            .map(|chat| chat.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn message_mut(
        &mut self,
        session_id: &str,
        message_id: &str,
    ) -> Option<&mut ConversationMessage> {
        self.chats.get_mut(session_id)?.message_mut(message_id)
    }

    /// Bump `updated_at` on a known session
    pub fn touch_session(&mut self, session_id: &str, now: i64) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.touch(now);
        }
    }

    pub fn should_apply(&mut self, event: &AgentEvent) -> bool {
        self.dedup.should_apply(event)
    }
}
