//! Message merge engine.
//!
//! `reduce` applies one validated event to one session's chat and returns the
//! persistence effects the change requires. It never performs I/O and never
//! fails: a missing correlation target resolves through a fixed fallback chain
//! and, when the chain is exhausted, the event is dropped with a warning.
//!
//! Fallback chains, in priority order:
//!
//! | event         | chain                                                               |
//! |---------------|---------------------------------------------------------------------|
//! | `chunk`       | id, thinking assistant (re-keyed), latest streaming (un-keyed only), create |
//! | `tool_call`   | id, latest open assistant, create (thinking)                        |
//! | `tool_result` | id, back-reference scan, latest open assistant, drop                |
//! | `done`        | id (keyed) or latest open assistant (un-keyed), then the sweep      |
//!
//! History reconciliation replaces the visible list, so it also moves the
//! pagination cursor to the oldest reconciled message.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{
    AgentEvent, ConversationMessage, EventPayload, HistoryMessage, MessageRole, SessionChat,
};

/// Side effects requested by a merge
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Persist(ConversationMessage),
    PersistBatch(Vec<ConversationMessage>),
    /// Drop the row stored under `from` and save `message` under its new id
    Rekey {
        from: String,
        message: ConversationMessage,
    },
}

impl Effect {
    /// Number of messages the effect writes
    pub fn len(&self) -> usize {
        match self {
            Effect::Persist(_) | Effect::Rekey { .. } => 1,
            Effect::PersistBatch(messages) => messages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply `event` to `chat`. `now` is a Unix timestamp in milliseconds.
pub fn reduce(chat: &mut SessionChat, event: &AgentEvent, now: i64) -> Vec<Effect> {
    match &event.payload {
        EventPayload::Chunk { content, model } => {
            apply_chunk(chat, event, content, model.as_deref(), now)
        }
        EventPayload::ToolCall {
            id,
            name,
            arguments,
        } => apply_tool_call(chat, event, id, name, arguments, now),
        EventPayload::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => apply_tool_result(chat, event, tool_use_id, content, *is_error),
        EventPayload::Done { .. } => apply_done(chat, event, now),
        EventPayload::FinalMessageHistory { messages } => {
            apply_history(chat, event, messages, now)
        }
    }
}

fn apply_chunk(
    chat: &mut SessionChat,
    event: &AgentEvent,
    content: &str,
    model: Option<&str>,
    now: i64,
) -> Vec<Effect> {
    let index = match locate_chunk_target(chat, event) {
        Some(index) => index,
        None => push_assistant(chat, event, now),
    };

    let message = &mut chat.messages[index];
    let mut previous_id = None;
    if let Some(id) = &event.message_id
        && message.id != *id
    {
        debug!(from = %message.id, to = %id, "Re-keying thinking placeholder");
        previous_id = Some(std::mem::replace(&mut message.id, id.clone()));
    }

    message.append_text(content);
    message.is_streaming = true;
    message.thinking = false;
    if let Some(model) = model {
        message.model = Some(model.to_string());
    }

    // The placeholder may already be stored under its old id
    match previous_id {
        Some(from) => vec![Effect::Rekey {
            from,
            message: message.clone(),
        }],
        None => Vec::new(),
    }
}

fn locate_chunk_target(chat: &SessionChat, event: &AgentEvent) -> Option<usize> {
    if let Some(index) = event.message_id.as_deref().and_then(|id| position(chat, id)) {
        return Some(index);
    }
    if let Some(index) = latest_assistant(chat, |m| m.thinking) {
        return Some(index);
    }
    if event.message_id.is_none() {
        return latest_assistant(chat, |m| m.is_streaming);
    }
    None
}

fn apply_tool_call(
    chat: &mut SessionChat,
    event: &AgentEvent,
    tool_use_id: &str,
    name: &str,
    arguments: &Value,
    now: i64,
) -> Vec<Effect> {
    let located = event
        .message_id
        .as_deref()
        .and_then(|id| position(chat, id))
        .or_else(|| latest_assistant(chat, ConversationMessage::is_open));

    let index = match located {
        Some(index) => index,
        None => {
            let index = push_assistant(chat, event, now);
            chat.messages[index].thinking = true;
            index
        }
    };

    let message = &mut chat.messages[index];
    if !message.push_tool_use(tool_use_id, name, arguments.clone()) {
        debug!(tool_use_id = %tool_use_id, message_id = %message.id, "Tool call already recorded");
    }

    Vec::new()
}

fn apply_tool_result(
    chat: &mut SessionChat,
    event: &AgentEvent,
    tool_use_id: &str,
    content: &Value,
    is_error: bool,
) -> Vec<Effect> {
    let located = event
        .message_id
        .as_deref()
        .and_then(|id| position(chat, id))
        .or_else(|| {
            chat.messages
                .iter()
                .rposition(|m| m.has_tool_use_id(tool_use_id))
        })
        .or_else(|| latest_assistant(chat, ConversationMessage::is_open));

    let Some(index) = located else {
        warn!(
            session_id = %event.session_id,
            tool_use_id = %tool_use_id,
            "Dropping tool result with no matching tool use or open message"
        );
        return Vec::new();
    };

    let message = &mut chat.messages[index];
    message.upsert_tool_result(tool_use_id, content.clone(), is_error);

    vec![Effect::Persist(message.clone())]
}

fn apply_done(chat: &mut SessionChat, event: &AgentEvent, now: i64) -> Vec<Effect> {
    let target = match event.message_id.as_deref() {
        Some(id) => position(chat, id),
        None => latest_assistant(chat, ConversationMessage::is_open),
    };

    let mut effects = Vec::new();

    match target {
        Some(index) => {
            let message = &mut chat.messages[index];
            finalize(message, now);
            effects.push(Effect::Persist(message.clone()));
        }
        None => debug!(
            session_id = %event.session_id,
            message_id = ?event.message_id,
            "Completion marker has no target message"
        ),
    }

    // Open assistant messages that already issued a tool call belong to a
    // real turn that will never get its own marker. Messages without tool
    // use are left alone.
    for (index, message) in chat.messages.iter_mut().enumerate() {
        if Some(index) == target
            || !message.is_assistant()
            || !message.is_open()
            || !message.has_tool_use()
        {
            continue;
        }
        debug!(message_id = %message.id, "Finalizing abandoned tool turn");
        finalize(message, now);
        effects.push(Effect::Persist(message.clone()));
    }

    effects
}

fn apply_history(
    chat: &mut SessionChat,
    event: &AgentEvent,
    items: &[HistoryMessage],
    now: i64,
) -> Vec<Effect> {
    let known: HashSet<&str> = chat.messages.iter().map(|m| m.id.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut previous: Option<i64> = None;
    let mut rebuilt = Vec::with_capacity(items.len());

    for (slot, item) in items.iter().enumerate() {
        let id = item
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| {
                // An id-less snapshot keeps the local id at the same slot
                chat.messages
                    .get(slot)
                    .filter(|local| local.role == item.role)
                    .map(|local| local.id.clone())
            })
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if !seen.insert(id.clone()) {
            warn!(message_id = %id, "Skipping duplicate id in history snapshot");
            continue;
        }

        let mut created_at = item.created_at.unwrap_or(now);
        if let Some(prev) = previous
            && created_at <= prev
        {
            created_at = prev + 1;
        }
        previous = Some(created_at);

        let mut message =
            ConversationMessage::new(id, event.session_id.clone(), item.role, created_at);
        message.content = item.content.clone().into_parts();
        message.model = item.model.clone();
        message.read = chat
            .message(&message.id)
            .map(|local| local.read)
            .unwrap_or(item.role != MessageRole::Assistant);

        rebuilt.push(message);
    }

    let fresh: Vec<ConversationMessage> = rebuilt
        .iter()
        .filter(|m| !known.contains(m.id.as_str()))
        .cloned()
        .collect();

    debug!(
        session_id = %event.session_id,
        total = rebuilt.len(),
        fresh = fresh.len(),
        "Reconciled history snapshot"
    );

    chat.messages = rebuilt;
    if let Some(oldest) = chat.messages.first() {
        chat.pagination.last_loaded_timestamp = Some(oldest.created_at);
        chat.pagination.total_loaded = chat.messages.len();
    }

    if fresh.is_empty() {
        Vec::new()
    } else {
        vec![Effect::PersistBatch(fresh)]
    }
}

fn finalize(message: &mut ConversationMessage, now: i64) {
    message.is_streaming = false;
    message.thinking = false;
    message.finalized_at.get_or_insert(now);
}

fn position(chat: &SessionChat, id: &str) -> Option<usize> {
    chat.messages.iter().position(|m| m.id == id)
}

fn latest_assistant(
    chat: &SessionChat,
    predicate: impl Fn(&ConversationMessage) -> bool,
) -> Option<usize> {
    chat.messages
        .iter()
        .rposition(|m| m.is_assistant() && predicate(m))
}

/// Append an empty assistant message and return its index
fn push_assistant(chat: &mut SessionChat, event: &AgentEvent, now: i64) -> usize {
    let id = event
        .message_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let created_at = chat
        .last_timestamp()
        .map(|last| now.max(last + 1))
        .unwrap_or(now);

    chat.messages.push(ConversationMessage::new(
        id,
        event.session_id.clone(),
        MessageRole::Assistant,
        created_at,
    ));
    chat.messages.len() - 1
}
