use super::message::ConversationMessage;

/// Per-session pagination cursor for "load older" requests
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaginationState {
    pub has_more: bool,
    pub is_loading_more: bool,
    pub total_loaded: usize,
    /// `created_at` of the oldest loaded message
    pub last_loaded_timestamp: Option<i64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HistoryStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
}

/// Complete message history cached for building outbound context.
///
/// Reset to `Idle` whenever a fresh initial page replaces the visible list.
#[derive(Clone, Debug, Default)]
pub struct HistoryBuffer {
    status: HistoryStatus,
    messages: Vec<ConversationMessage>,
}

impl HistoryBuffer {
    pub fn status(&self) -> HistoryStatus {
        self.status
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Returns false if a load is already in flight or complete
    pub fn begin_loading(&mut self) -> bool {
        if self.status != HistoryStatus::Idle {
            return false;
        }
        self.status = HistoryStatus::Loading;
        true
    }

    pub fn finish_loading(&mut self, messages: Vec<ConversationMessage>) {
        self.messages = messages;
        self.status = HistoryStatus::Loaded;
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.status = HistoryStatus::Idle;
    }

    /// Record a message sent after the buffer was loaded
    pub fn append(&mut self, message: ConversationMessage) {
        if self.status == HistoryStatus::Loaded
            && !self.messages.iter().any(|m| m.id == message.id)
        {
            self.messages.push(message);
        }
    }
}

/// Visible message list plus its pagination and history buffer
#[derive(Clone, Debug, Default)]
pub struct SessionChat {
    pub messages: Vec<ConversationMessage>,
    pub pagination: PaginationState,
    pub full_history: HistoryBuffer,
}

impl SessionChat {
    pub fn message(&self, id: &str) -> Option<&ConversationMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut ConversationMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Latest `created_at` in the visible list
    pub fn last_timestamp(&self) -> Option<i64> {
        self.messages.iter().map(|m| m.created_at).max()
    }
}
