//! SSE parsing for OpenAI-compatible chat completion streams.
//!
//! The wire format:
//!
//! ```text
//! data: {"id":"...","choices":[{"delta":{"content":"Hello"},...}]}
//! data: {"id":"...","choices":[{"delta":{"content":" world"},...}]}
//! data: [DONE]
//! ```
//!
//! Malformed frames are skipped individually instead of aborting the stream.

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::{StreamChunk, TokenUsage};

// ---------------------------------------------------------------------------
// Wire types (deserialization only)
// ---------------------------------------------------------------------------

/// Top-level SSE JSON frame from `/chat/completions` (streaming).
#[derive(Debug, Deserialize)]
pub(crate) struct SseFrame {
    pub choices: Vec<SseChoice>,
    pub usage: Option<SseUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SseChoice {
    pub delta: Option<SseDelta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SseDelta {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SseUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Non-streaming response from `/chat/completions` with `stream: false`.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionMessage {
    pub content: Option<String>,
}

impl SseUsage {
    fn to_token_usage(&self) -> TokenUsage {
        let prompt = self.prompt_tokens.unwrap_or(0);
        let completion = self.completion_tokens.unwrap_or(0);
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: self.total_tokens.unwrap_or(prompt + completion),
        }
    }
}

// ---------------------------------------------------------------------------
// SSE stream driver
// ---------------------------------------------------------------------------

/// Consume a `reqwest::Response` carrying SSE chat completion deltas and
/// forward them as [`StreamChunk`]s on `tx`. Meant to run under `tokio::spawn`.
pub(crate) async fn drive_sse_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamChunk>) {
    let mut stream = resp.bytes_stream();
    let mut buffer = String::new();
    let mut final_usage: Option<TokenUsage> = None;

    while let Some(chunk_result) = stream.next().await {
        let bytes = match chunk_result {
            Ok(b) => b,
            Err(e) => {
                warn!("SSE stream read error: {e}");
                break;
            }
        };

        buffer.push_str(&String::from_utf8_lossy(&bytes));

        // Process complete lines from the buffer.
        while let Some(newline_pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline_pos).collect();
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            // SSE data lines start with "data: "; comments and other fields skip.
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };

            // Terminal sentinel.
            if data == "[DONE]" {
                let _ = tx
                    .send(StreamChunk {
                        content: String::new(),
                        done: true,
                        usage: final_usage.take(),
                    })
                    .await;
                return;
            }

            match serde_json::from_str::<SseFrame>(data) {
                Ok(frame) => {
                    let content = frame
                        .choices
                        .first()
                        .and_then(|c| c.delta.as_ref())
                        .and_then(|d| d.content.clone())
                        .unwrap_or_default();

                    if let Some(usage) = &frame.usage {
                        final_usage = Some(usage.to_token_usage());
                    }

                    // Skip empty role-only deltas.
                    if !content.is_empty() {
                        let chunk = StreamChunk {
                            content,
                            done: false,
                            usage: None,
                        };
                        if tx.send(chunk).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                }
                Err(e) => {
                    debug!("Skipping malformed SSE JSON: {e} -- data: {data}");
                }
            }
        }
    }

    // Stream ended without [DONE] -- send a final sentinel.
    let _ = tx
        .send(StreamChunk {
            content: String::new(),
            done: true,
            usage: final_usage,
        })
        .await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
