//! OpenAI-compatible chat-completion client.
//!
//! Uses raw `reqwest` against `/chat/completions`. Streaming uses SSE
//! (`stream: true`) with the parsing logic in [`crate::sse`].

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::gateway::CompletionBackend;
use crate::sse::{self, ChatCompletionResponse};
use crate::types::{ChatRequest, GatewayError, PromptMessage, StreamChunk};

// ---------------------------------------------------------------------------
// Wire types (serialization only)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
    /// When streaming, ask the API to include usage in the final chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

impl From<&PromptMessage> for WireMessage {
    fn from(m: &PromptMessage) -> Self {
        Self {
            role: m.role.clone(),
            content: m.content.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible chat-completion endpoint.
pub struct OpenAIClient {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    /// Pass an empty string or `None` for `api_key` to create a client that
    /// fails with [`GatewayError::InvalidKey`] until configured.
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn require_key(&self) -> Result<&str, GatewayError> {
        self.api_key.as_deref().ok_or(GatewayError::InvalidKey)
    }

    fn build_body(request: &ChatRequest, stream: bool) -> WireChatRequest {
        WireChatRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    /// Send a POST to the chat completions endpoint and map HTTP error codes
    /// to typed errors.
    async fn post_completions(
        &self,
        body: &WireChatRequest,
    ) -> Result<reqwest::Response, GatewayError> {
        let key = self.require_key()?;
        let url = format!("{}/chat/completions", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GatewayError::InvalidKey);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimit);
        }
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::GATEWAY_TIMEOUT
        {
            return Err(GatewayError::Timeout);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Api(format!("{status}: {text}")));
        }

        Ok(resp)
    }
}

#[async_trait]
impl CompletionBackend for OpenAIClient {
    /// Non-streaming completion: first choice's message content.
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let body = Self::build_body(request, false);
        let resp = self.post_completions(&body).await?;

        let data: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Api(format!("JSON parse error: {e}")))?;

        data.choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.is_empty())
            .ok_or(GatewayError::EmptyResponse)
    }

    /// Streaming completion via SSE; the driver task runs until the stream
    /// ends, the receiver is dropped, or the task is aborted.
    async fn stream(
        &self,
        request: &ChatRequest,
    ) -> Result<(mpsc::Receiver<StreamChunk>, AbortHandle), GatewayError> {
        let body = Self::build_body(request, true);
        let resp = self.post_completions(&body).await?;

        let (tx, rx) = mpsc::channel::<StreamChunk>(64);
        let task = tokio::spawn(async move {
            sse::drive_sse_stream(resp, tx).await;
        });

        Ok((rx, task.abort_handle()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(model: &str) -> ChatRequest {
        ChatRequest {
            model: model.into(),
            messages: vec![
                PromptMessage::system("You are helpful."),
                PromptMessage::user("Hello"),
            ],
            temperature: Some(0.2),
            max_tokens: 512,
        }
    }

    #[test]
    fn build_body_non_streaming() {
        let body = OpenAIClient::build_body(&sample_request("gpt-4o"), false);
        assert_eq!(body.model, "gpt-4o");
        assert_eq!(body.max_tokens, 512);
        assert!(!body.stream);
        assert!(body.stream_options.is_none());
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
    }

    #[test]
    fn build_body_stream_includes_usage_option() {
        let body = OpenAIClient::build_body(&sample_request("gpt-4o"), true);
        assert!(body.stream);
        assert!(body.stream_options.unwrap().include_usage);
    }

    #[test]
    fn request_body_serializes_correctly() {
        let body = OpenAIClient::build_body(&sample_request("gpt-4o-mini"), false);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["stream"], false);
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["messages"][1]["content"], "Hello");
        assert!(json.get("stream_options").is_none());
    }

    #[test]
    fn empty_api_key_is_treated_as_missing() {
        let client = OpenAIClient::new(Some(String::new()), "https://api.openai.com/v1");
        assert!(matches!(
            client.require_key(),
            Err(GatewayError::InvalidKey)
        ));
    }

    #[test]
    fn present_api_key_is_accepted() {
        let client = OpenAIClient::new(Some("sk-test".into()), "https://api.openai.com/v1");
        assert_eq!(client.require_key().unwrap(), "sk-test");
    }

    #[tokio::test]
    async fn complete_fails_fast_without_key() {
        let client = OpenAIClient::new(None, "https://api.openai.com/v1");
        let err = client.complete(&sample_request("gpt-4o")).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidKey));
    }
}
