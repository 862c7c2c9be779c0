use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors the gateway may surface. Callers of [`crate::ModelGateway::call`]
/// never see these - they are absorbed by the retry/apology policy.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API key")]
    InvalidKey,

    #[error("Rate limited")]
    RateLimit,

    #[error("Timeout")]
    Timeout,

    #[error("API error: {0}")]
    Api(String),

    #[error("Empty response from model")]
    EmptyResponse,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One chat-completion message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// System prompt used when a caller supplies nothing better.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant for a drug-discovery workflow application. \
     Answer clearly and concisely.";

/// The shapes a caller may hand the gateway as a prompt. All of them
/// normalize into an ordered message list.
#[derive(Debug, Clone, Default)]
pub enum PromptInput {
    /// A bare string becomes a single system message.
    Text(String),
    /// A single pre-built role/content pair.
    Message(PromptMessage),
    /// A full message list, used verbatim.
    Messages(Vec<PromptMessage>),
    /// Fall back to [`DEFAULT_SYSTEM_PROMPT`].
    #[default]
    Default,
}

impl PromptInput {
    /// Normalize into a message list, appending the user message if present.
    pub fn into_messages(self, user_message: Option<&str>) -> Vec<PromptMessage> {
        let mut messages = match self {
            Self::Text(text) => vec![PromptMessage::system(text)],
            Self::Message(message) => vec![message],
            Self::Messages(messages) => messages,
            Self::Default => vec![PromptMessage::system(DEFAULT_SYSTEM_PROMPT)],
        };
        if let Some(user) = user_message {
            messages.push(PromptMessage::user(user));
        }
        messages
    }
}

// ---------------------------------------------------------------------------
// Requests and streaming
// ---------------------------------------------------------------------------

/// A normalized chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

/// A single delta from a streaming completion.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub content: String,
    pub done: bool,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
