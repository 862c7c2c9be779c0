//! Bounded in-memory chat log used for UI display.
//!
//! Append-only, capped at the most recent [`CHAT_LOG_CAPACITY`] messages;
//! older entries are discarded, not archived. The planner never reads this
//! log - it exists only so the UI can render the conversation.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use uuid::Uuid;

/// Maximum number of messages retained.
pub const CHAT_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single displayed chat turn. Content is always a string - structured
/// payloads are serialized before storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }
}

/// Size-bounded message log.
#[derive(Default)]
pub struct ChatLog {
    messages: Mutex<VecDeque<ChatMessage>>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, content: impl Into<Value>) -> ChatMessage {
        self.push(ChatRole::User, content.into())
    }

    pub fn add_assistant(&self, content: impl Into<Value>) -> ChatMessage {
        self.push(ChatRole::Assistant, content.into())
    }

    fn push(&self, role: ChatRole, content: Value) -> ChatMessage {
        let message = ChatMessage::new(role, coerce_to_string(content));
        let mut messages = self.messages.lock();
        messages.push_back(message.clone());
        while messages.len() > CHAT_LOG_CAPACITY {
            messages.pop_front();
        }
        message
    }

    /// Snapshot of all retained messages, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().iter().cloned().collect()
    }

    pub fn last(&self) -> Option<ChatMessage> {
        self.messages.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

/// Strings are stored as-is; every other JSON value is serialized so the log
/// never holds a raw object.
fn coerce_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
