pub mod chat;
pub mod config;
pub mod context;
pub mod logging;
pub mod narrator;
pub mod trace;

pub use chat::{ChatLog, ChatMessage, ChatRole, CHAT_LOG_CAPACITY};
pub use config::HelixConfig;
pub use context::{ContextData, ContextStore, WorkflowContext};
pub use narrator::{describe, can_transition_to_step, title_case, Transition};
pub use trace::{ExecutionTrace, TraceEntry};
