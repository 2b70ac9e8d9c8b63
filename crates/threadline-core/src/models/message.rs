use serde::{Deserialize, Serialize};

/// Author of a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Error,
}

/// Delivery state of a message as seen by the consumer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Inserted locally, not yet confirmed by the store or the backend
    Sending,
    #[default]
    Sent,
    Error,
}

/// One typed fragment of a message.
///
/// Parts keep their arrival order inside a message. `ToolUse` ids are unique
/// within a message and `ToolResult` parts are keyed by their back-reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

/// A single message inside a session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub thinking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub status: MessageStatus,
    /// Cause of the last failure when `status` is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub read: bool,
    /// Set when a completion marker finalizes the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<i64>,
}

impl ConversationMessage {
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        role: MessageRole,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            role,
            content: Vec::new(),
            created_at,
            is_streaming: false,
            thinking: false,
            model: None,
            status: MessageStatus::Sent,
            error: None,
            read: false,
            finalized_at: None,
        }
    }

    /// Locally-identified user message awaiting confirmation
    pub fn user(session_id: impl Into<String>, text: impl Into<String>, created_at: i64) -> Self {
        let mut message = Self::new(
            uuid::Uuid::new_v4().to_string(),
            session_id,
            MessageRole::User,
            created_at,
        );
        message.content.push(ContentPart::text(text));
        message.status = MessageStatus::Sending;
        message.read = true;
        message
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    /// Still receiving fragments or waiting for its first one
    pub fn is_open(&self) -> bool {
        self.is_streaming || self.thinking
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|part| matches!(part, ContentPart::ToolUse { .. }))
    }

    pub fn has_tool_use_id(&self, tool_use_id: &str) -> bool {
        self.content
            .iter()
            .any(|part| matches!(part, ContentPart::ToolUse { id, .. } if id == tool_use_id))
    }

    /// Concatenated text of every `Text` part
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Append to the message's text part, creating it if absent
    pub fn append_text(&mut self, fragment: &str) {
        let existing = self.content.iter_mut().find_map(|part| match part {
            ContentPart::Text { text } => Some(text),
            _ => None,
        });

        match existing {
            Some(text) => text.push_str(fragment),
            None => self.content.push(ContentPart::text(fragment)),
        }
    }

    /// Returns false when a `ToolUse` part with the same id already exists
    pub fn push_tool_use(&mut self, id: &str, name: &str, input: serde_json::Value) -> bool {
        if self.has_tool_use_id(id) {
            return false;
        }
        self.content.push(ContentPart::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        });
        true
    }

    /// Insert or overwrite the result for `tool_use_id`
    pub fn upsert_tool_result(
        &mut self,
        tool_use_id: &str,
        result: serde_json::Value,
        failed: bool,
    ) {
        let existing = self.content.iter_mut().find(|part| {
            matches!(part, ContentPart::ToolResult { tool_use_id: id, .. } if id == tool_use_id)
        });

        match existing {
            Some(ContentPart::ToolResult {
                content, is_error, ..
            }) => {
                *content = result;
                *is_error = failed;
            }
            _ => self.content.push(ContentPart::ToolResult {
                tool_use_id: tool_use_id.to_string(),
                content: result,
                is_error: failed,
            }),
        }
    }

    pub fn mark_sent(&mut self) {
        self.status = MessageStatus::Sent;
        self.error = None;
    }

    pub fn mark_error(&mut self, cause: impl Into<String>) {
        self.status = MessageStatus::Error;
        self.error = Some(cause.into());
    }
}
