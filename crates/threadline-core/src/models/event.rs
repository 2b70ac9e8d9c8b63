//! Inbound push events from the agent runtime.
//!
//! Payloads arrive as loose JSON objects. They are validated once, here, into
//! an [`AgentEvent`] whose [`EventPayload`] is matched exhaustively by the
//! merge engine. Anything that does not satisfy its variant is rejected at the
//! boundary and never reaches conversation state.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::message::{ContentPart, MessageRole};

/// Type tags the engine understands
const KNOWN_TYPES: &[&str] = &[
    "chunk",
    "token",
    "tool_call",
    "tool_result",
    "done",
    "final_message_history",
];

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event payload has no type tag")]
    MissingType,

    #[error("unknown event type: {0}")]
    UnknownType(String),

    #[error("malformed {kind} event: {message}")]
    Malformed { kind: String, message: String },
}

/// Fields shared by every event kind
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    seq: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    #[serde(alias = "token")]
    Chunk {
        #[serde(alias = "text", alias = "delta")]
        content: String,
        #[serde(default)]
        model: Option<String>,
    },
    ToolCall {
        id: String,
        name: String,
        #[serde(default, alias = "input")]
        arguments: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    Done {
        #[serde(default)]
        stop_reason: Option<String>,
    },
    FinalMessageHistory {
        messages: Vec<HistoryMessage>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Chunk { .. } => "chunk",
            EventPayload::ToolCall { .. } => "tool_call",
            EventPayload::ToolResult { .. } => "tool_result",
            EventPayload::Done { .. } => "done",
            EventPayload::FinalMessageHistory { .. } => "final_message_history",
        }
    }
}

/// Message content in a history snapshot: plain text or typed parts
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HistoryContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for HistoryContent {
    fn default() -> Self {
        HistoryContent::Parts(Vec::new())
    }
}

impl HistoryContent {
    pub fn into_parts(self) -> Vec<ContentPart> {
        match self {
            HistoryContent::Text(text) if text.is_empty() => Vec::new(),
            HistoryContent::Text(text) => vec![ContentPart::text(text)],
            HistoryContent::Parts(parts) => parts,
        }
    }
}

/// One entry of a `final_message_history` snapshot
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_history_role")]
    pub role: MessageRole,
    #[serde(default)]
    pub content: HistoryContent,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_history_role() -> MessageRole {
    MessageRole::Assistant
}

/// A validated inbound event
#[derive(Clone, Debug, PartialEq)]
pub struct AgentEvent {
    pub session_id: String,
    pub message_id: Option<String>,
    pub event_id: Option<String>,
    pub seq: Option<u64>,
    pub payload: EventPayload,
}

impl AgentEvent {
    pub fn new(session_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            session_id: session_id.into(),
            message_id: None,
            event_id: None,
            seq: None,
            payload,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Validate a raw payload against the variant named by its `type` tag
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EventError::MissingType)?
            .to_string();

        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(EventError::UnknownType(kind));
        }

        let malformed = |message: String| EventError::Malformed {
            kind: kind.clone(),
            message,
        };

        let envelope: Envelope =
            serde_json::from_value(value.clone()).map_err(|e| malformed(e.to_string()))?;

        if envelope.session_id.trim().is_empty() {
            return Err(malformed("missing session_id".to_string()));
        }

        let payload: EventPayload =
            serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

        Ok(Self {
            session_id: envelope.session_id,
            message_id: envelope.message_id.filter(|id| !id.is_empty()),
            event_id: envelope.event_id.filter(|id| !id.is_empty()),
            seq: envelope.seq,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_token_alias_as_chunk() {
        let event = AgentEvent::from_value(json!({
            "type": "token",
            "session_id": "s1",
            "message_id": "m1",
            "seq": 3,
            "text": "Hi"
        }))
        .unwrap();

        assert_eq!(event.session_id, "s1");
        assert_eq!(event.message_id.as_deref(), Some("m1"));
        assert_eq!(event.seq, Some(3));
        assert_eq!(
            event.payload,
            EventPayload::Chunk {
                content: "Hi".to_string(),
                model: None,
            }
        );
    }

    #[test]
    fn test_parses_tool_call_with_input_alias() {
        let event = AgentEvent::from_value(json!({
            "type": "tool_call",
            "session_id": "s1",
            "id": "t1",
            "name": "bash",
            "input": {"cmd": "ls"}
        }))
        .unwrap();

        match event.payload {
            EventPayload::ToolCall {
                id,
                name,
                arguments,
            } => {
                assert_eq!(id, "t1");
                assert_eq!(name, "bash");
                assert_eq!(arguments, json!({"cmd": "ls"}));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_done_ignores_extra_fields() {
        let event = AgentEvent::from_value(json!({
            "type": "done",
            "session_id": "s1",
            "usage": {"input_tokens": 10}
        }))
        .unwrap();
        assert_eq!(event.payload, EventPayload::Done { stop_reason: None });
    }

    #[test]
    fn test_history_accepts_string_and_part_content() {
        let event = AgentEvent::from_value(json!({
            "type": "final_message_history",
            "session_id": "s1",
            "messages": [
                {"id": "a", "role": "user", "content": "hello"},
                {"role": "assistant", "content": [{"type": "text", "text": "hi"}]}
            ]
        }))
        .unwrap();

        let EventPayload::FinalMessageHistory { messages } = event.payload else {
            panic!("expected history payload");
        };
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(
            messages[0].content.clone().into_parts(),
            vec![ContentPart::text("hello")]
        );
        assert_eq!(messages[1].id, None);
    }

    #[test]
    fn test_rejects_missing_session_id() {
        let err = AgentEvent::from_value(json!({"type": "done"})).unwrap_err();
        assert!(matches!(err, EventError::Malformed { .. }));
    }

    #[test]
    fn test_rejects_wrong_field_types() {
        let err = AgentEvent::from_value(json!({
            "type": "tool_result",
            "session_id": "s1",
            "tool_use_id": 17
        }))
        .unwrap_err();
        assert!(matches!(err, EventError::Malformed { .. }));
    }

    #[test]
    fn test_unknown_and_missing_type() {
        assert!(matches!(
            AgentEvent::from_value(json!({"type": "ping", "session_id": "s1"})),
            Err(EventError::UnknownType(kind)) if kind == "ping"
        ));
        assert!(matches!(
            AgentEvent::from_value(json!({"session_id": "s1"})),
            Err(EventError::MissingType)
        ));
    }
}
