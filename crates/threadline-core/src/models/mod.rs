pub mod conversations_store;
pub mod dedup_registry;
pub mod error_store;
pub mod event;
pub mod message;
pub mod session;
pub mod session_chat;

pub use conversations_store::{ConversationsStore, SharedConversationsStore};
pub use dedup_registry::DedupRegistry;
pub use error_store::{ErrorEntry, ErrorLevel, ErrorStore};
pub use event::{AgentEvent, EventError, EventPayload, HistoryContent, HistoryMessage};
pub use message::{ContentPart, ConversationMessage, MessageRole, MessageStatus};
pub use session::{Session, SessionOverrides};
pub use session_chat::{HistoryBuffer, HistoryStatus, PaginationState, SessionChat};

/// Current Unix time in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
