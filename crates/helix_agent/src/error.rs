//! Error taxonomy for the orchestration pipeline.
//!
//! Every variant is caught at the nearest component boundary and converted
//! into a best-effort result; nothing here ever reaches the UI layer as a
//! raw error.

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The model's plan output could not be parsed. Degrades to a one-step
    /// direct-answer plan.
    #[error("Could not parse plan from model output: {0}")]
    PlanParse(String),

    /// No descriptor (exact or fallback) matched the requested action id.
    #[error("Action '{0}' is not available in the current context")]
    ActionNotFound(String),

    /// A descriptor exists but the UI never registered its callback.
    #[error("Callback for action '{0}' is not registered")]
    CallbackNotRegistered(String),

    /// Any other failure inside a plan step. Aborts the plan only when the
    /// step was marked critical.
    #[error("Step execution failed: {0}")]
    StepExecution(String),

    #[error(transparent)]
    Gateway(#[from] helix_ai::GatewayError),
}
