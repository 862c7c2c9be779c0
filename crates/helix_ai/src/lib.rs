pub mod gateway;
pub mod openai;
pub(crate) mod sse;
pub mod types;

pub use gateway::{CompletionBackend, ModelGateway, StreamHandle, APOLOGY_REPLY};
pub use openai::OpenAIClient;
pub use types::{ChatRequest, GatewayError, PromptInput, PromptMessage, StreamChunk, TokenUsage};
