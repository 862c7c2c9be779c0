//! Model gateway - the only component that performs model network calls.
//!
//! Wraps a [`CompletionBackend`] with the degradation policy the rest of the
//! system relies on: one automatic retry on a smaller model with a simplified
//! prompt, then a fixed apologetic reply. [`ModelGateway::call`] therefore
//! never returns an error to its caller.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use helix_core::HelixConfig;

use crate::openai::OpenAIClient;
use crate::types::{ChatRequest, GatewayError, PromptInput, PromptMessage, StreamChunk};

/// Returned when both the primary call and the fallback retry fail.
pub const APOLOGY_REPLY: &str =
    "I'm sorry, I couldn't process that request right now. Please try again in a moment.";

/// Single-line prompt used for the fallback retry.
const SIMPLIFIED_PROMPT: &str =
    "You are a concise assistant for a drug-discovery application. Answer the user briefly.";

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Transport seam under the gateway. The production implementation is
/// [`OpenAIClient`]; tests inject scripted backends.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Non-streaming completion returning the assistant text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError>;

    /// Streaming completion; the abort handle cancels the driver task.
    async fn stream(
        &self,
        request: &ChatRequest,
    ) -> Result<(mpsc::Receiver<StreamChunk>, AbortHandle), GatewayError>;
}

// ---------------------------------------------------------------------------
// Stream handle
// ---------------------------------------------------------------------------

/// Caller-owned handle to an in-flight streaming completion.
///
/// Cancelling aborts the driver task and releases the connection; an aborted
/// stream simply stops yielding chunks - it is never surfaced as an error.
pub struct StreamHandle {
    pub chunks: mpsc::Receiver<StreamChunk>,
    abort: AbortHandle,
}

impl StreamHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// Split into the raw receiver and abort handle, for callers that
    /// forward chunks through their own channel.
    pub fn into_parts(self) -> (mpsc::Receiver<StreamChunk>, AbortHandle) {
        (self.chunks, self.abort)
    }

    /// Drain the stream to completion, concatenating content chunks.
    pub async fn collect(mut self) -> String {
        let mut text = String::new();
        while let Some(chunk) = self.chunks.recv().await {
            text.push_str(&chunk.content);
            if chunk.done {
                break;
            }
        }
        text
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct ModelGateway {
    backend: Arc<dyn CompletionBackend>,
    primary_model: String,
    fallback_model: String,
    temperature: Option<f32>,
    max_tokens: u32,
}

impl ModelGateway {
    /// Production constructor: an [`OpenAIClient`] against the configured
    /// endpoint.
    pub fn new(config: &HelixConfig) -> Self {
        let client = OpenAIClient::new(config.api_key.clone(), config.base_url.clone());
        Self::with_backend(
            Arc::new(client),
            &config.primary_model,
            &config.fallback_model,
        )
        .temperature(config.temperature)
        .max_tokens(config.max_tokens)
    }

    /// Construct over an arbitrary backend (dependency injection / tests).
    pub fn with_backend(
        backend: Arc<dyn CompletionBackend>,
        primary_model: &str,
        fallback_model: &str,
    ) -> Self {
        Self {
            backend,
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
            temperature: None,
            max_tokens: 1024,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn request(&self, model: &str, messages: Vec<PromptMessage>) -> ChatRequest {
        ChatRequest {
            model: model.into(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Non-streaming call. Normalizes the prompt, appends the user message,
    /// and asks the primary model. On failure, exactly one retry runs with
    /// the fallback model and a simplified single-line prompt; if that fails
    /// too the fixed apology is returned. Never errors.
    pub async fn call(&self, prompt: PromptInput, user_message: Option<&str>) -> String {
        let messages = prompt.into_messages(user_message);
        let request = self.request(&self.primary_model, messages.clone());

        match self.backend.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "Primary model {} failed ({e}), retrying once with {}",
                    self.primary_model, self.fallback_model
                );
                self.retry_simplified(&messages, user_message).await
            }
        }
    }

    /// The single fallback retry. Not re-entered on failure - the error path
    /// terminates in the apology literal.
    async fn retry_simplified(
        &self,
        original: &[PromptMessage],
        user_message: Option<&str>,
    ) -> String {
        let user = user_message
            .map(str::to_string)
            .or_else(|| {
                original
                    .iter()
                    .rev()
                    .find(|m| m.role == "user")
                    .map(|m| m.content.clone())
            })
            .unwrap_or_default();

        let messages = vec![
            PromptMessage::system(SIMPLIFIED_PROMPT),
            PromptMessage::user(user),
        ];
        let request = self.request(&self.fallback_model, messages);

        match self.backend.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Fallback model {} also failed: {e}", self.fallback_model);
                APOLOGY_REPLY.to_string()
            }
        }
    }

    /// Streaming call. The returned handle owns cancellation; dropping the
    /// receiver also ends the driver task.
    pub async fn stream(
        &self,
        prompt: PromptInput,
        user_message: Option<&str>,
    ) -> Result<StreamHandle, GatewayError> {
        let messages = prompt.into_messages(user_message);
        let request = self.request(&self.primary_model, messages);
        debug!("Opening streaming completion on {}", self.primary_model);
        let (chunks, abort) = self.backend.stream(&request).await?;
        Ok(StreamHandle { chunks, abort })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Backend that fails `fail_first` times, then echoes the model name.
    struct FlakyBackend {
        fail_first: usize,
        calls: Mutex<Vec<ChatRequest>>,
    }

    impl FlakyBackend {
        fn new(fail_first: usize) -> Self {
            Self {
                fail_first,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for FlakyBackend {
        async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
            let mut calls = self.calls.lock();
            calls.push(request.clone());
            if calls.len() <= self.fail_first {
                Err(GatewayError::Network("connection reset".into()))
            } else {
                Ok(format!("answer from {}", request.model))
            }
        }

        async fn stream(
            &self,
            _request: &ChatRequest,
        ) -> Result<(mpsc::Receiver<StreamChunk>, AbortHandle), GatewayError> {
            let (tx, rx) = mpsc::channel(8);
            let task = tokio::spawn(async move {
                let _ = tx
                    .send(StreamChunk {
                        content: "streamed".into(),
                        done: false,
                        usage: None,
                    })
                    .await;
                let _ = tx
                    .send(StreamChunk {
                        done: true,
                        ..Default::default()
                    })
                    .await;
            });
            Ok((rx, task.abort_handle()))
        }
    }

    fn gateway(backend: Arc<FlakyBackend>) -> ModelGateway {
        ModelGateway::with_backend(backend, "gpt-4o", "gpt-4o-mini")
    }

    #[tokio::test]
    async fn call_uses_primary_model_on_success() {
        let backend = Arc::new(FlakyBackend::new(0));
        let reply = gateway(backend.clone())
            .call(PromptInput::Default, Some("hi"))
            .await;
        assert_eq!(reply, "answer from gpt-4o");
        assert_eq!(backend.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn call_retries_once_with_fallback_model() {
        let backend = Arc::new(FlakyBackend::new(1));
        let reply = gateway(backend.clone())
            .call(PromptInput::Text("long prompt".into()), Some("question"))
            .await;
        assert_eq!(reply, "answer from gpt-4o-mini");

        let calls = backend.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, "gpt-4o");
        assert_eq!(calls[1].model, "gpt-4o-mini");
        // Retry uses the simplified prompt, not the original one.
        assert_ne!(calls[1].messages[0].content, "long prompt");
        assert_eq!(calls[1].messages[1].content, "question");
    }

    #[tokio::test]
    async fn call_returns_apology_after_two_failures() {
        let backend = Arc::new(FlakyBackend::new(2));
        let reply = gateway(backend.clone())
            .call(PromptInput::Default, Some("hi"))
            .await;
        assert_eq!(reply, APOLOGY_REPLY);
        // Exactly two attempts - no retry loop.
        assert_eq!(backend.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn retry_recovers_user_message_from_prompt() {
        let backend = Arc::new(FlakyBackend::new(1));
        let prompt = PromptInput::Messages(vec![
            PromptMessage::system("sys"),
            PromptMessage::user("embedded question"),
        ]);
        let reply = gateway(backend.clone()).call(prompt, None).await;
        assert_eq!(reply, "answer from gpt-4o-mini");
        let calls = backend.calls.lock();
        assert_eq!(calls[1].messages[1].content, "embedded question");
    }

    #[tokio::test]
    async fn stream_yields_chunks_until_done() {
        let backend = Arc::new(FlakyBackend::new(0));
        let handle = gateway(backend)
            .stream(PromptInput::Default, Some("hi"))
            .await
            .unwrap();
        let text = handle.collect().await;
        assert_eq!(text, "streamed");
    }

    #[tokio::test]
    async fn cancelled_stream_stops_yielding() {
        let backend = Arc::new(FlakyBackend::new(0));
        let mut handle = gateway(backend)
            .stream(PromptInput::Default, None)
            .await
            .unwrap();
        handle.cancel();
        // After the driver task is aborted the channel closes; draining
        // terminates instead of hanging.
        while handle.chunks.recv().await.is_some() {}
    }
}
