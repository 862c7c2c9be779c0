//! Plan model - typed steps produced by the language model.
//!
//! The parsed plan is untrusted input: step types are validated against the
//! closed [`StepKind`] enum at parse time, while action ids stay lazily bound
//! and are only validated when a step executes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::error::AgentError;

/// Matches a fenced code block (optionally tagged `json`) and captures its body.
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"));

/// Which executor handles a step. Closed set - unknown types fail parsing
/// and degrade the whole plan rather than being trusted structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Resolved by the data provider.
    Data,
    /// Resolved by the action registry.
    Action,
    /// Resolved by re-prompting the model with collected results.
    Llm,
}

/// One execution instruction inside a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Query type, action id, or answer label depending on `kind`.
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Failure of a critical step aborts all remaining steps.
    #[serde(default)]
    pub critical: bool,
}

/// An ordered plan for one user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default = "default_fallback_response")]
    pub fallback_response: String,
    /// Optional response template with `{workflow}`, `{currentStep}` and
    /// `{data.<key>}` placeholders.
    #[serde(default)]
    pub response: Option<String>,
}

fn default_fallback_response() -> String {
    "I wasn't able to complete that request.".to_string()
}

impl Plan {
    /// Minimal degradation plan: a single llm step that lets the gateway
    /// answer the user directly.
    pub fn direct_answer() -> Self {
        Self {
            steps: vec![PlanStep {
                kind: StepKind::Llm,
                action: "answer".into(),
                params: Map::new(),
                critical: false,
            }],
            fallback_response: default_fallback_response(),
            response: None,
        }
    }

    /// True when the plan is exactly the direct-answer degradation shape.
    pub fn is_direct_answer(&self) -> bool {
        self.steps.len() == 1 && self.steps[0].kind == StepKind::Llm
    }
}

/// One result per executed (or aborted) step, in input-step order.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: PlanStep,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn ok(step: PlanStep, output: Value) -> Self {
        Self {
            step,
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(step: PlanStep, error: impl Into<String>) -> Self {
        Self {
            step,
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn aborted(step: PlanStep) -> Self {
        Self::failed(step, "aborted")
    }
}

/// Permissive plan extraction: a fenced ```json block parses identically to
/// the same JSON given bare; failing both, the outermost `{...}` span is
/// tried. Step kinds are validated by the closed enum during deserialization.
pub fn parse_plan(raw: &str) -> Result<Plan, AgentError> {
    let candidate = extract_json(raw);
    serde_json::from_str(candidate.trim()).map_err(|e| AgentError::PlanParse(e.to_string()))
}

fn extract_json(raw: &str) -> &str {
    if let Some(captures) = FENCED_BLOCK.captures(raw) {
        return captures.get(1).map_or(raw, |m| m.as_str());
    }
    // Locate a bare outermost object.
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => raw,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
