//! Plan generator & executor - the per-turn state machine.
//!
//! One user turn flows `Idle → Planning → Executing → Formatting → Idle`.
//! Failures at any stage degrade instead of terminating: a malformed plan
//! becomes a direct-answer plan, a failed critical step aborts remaining
//! steps but still yields a reply, and an unexpected internal error is
//! converted into a generic chat message. The UI never sees a crash, a raw
//! error, or raw JSON.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use helix_ai::{APOLOGY_REPLY, ModelGateway, PromptInput, StreamChunk};
use helix_core::{ChatLog, ContextStore, ExecutionTrace, WorkflowContext, narrator};

use crate::actions::ActionRegistry;
use crate::data::DataProvider;
use crate::format;
use crate::plan::{Plan, PlanStep, StepKind, StepResult, parse_plan};

/// Returned without touching any state when a turn is already in flight.
pub const BUSY_REPLY: &str = "I'm still working on your previous request - one moment.";

/// Last-resort reply for a genuinely unexpected internal failure.
const ERROR_REPLY: &str =
    "I ran into an error processing your request. Please try again.";

/// Where the executor currently is in the turn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Planning,
    Executing,
    Formatting,
}

/// Result of a turn that may stream its answer.
pub enum TurnReply {
    /// A turn was already in flight; nothing was recorded.
    Busy(String),
    /// The turn completed synchronously.
    Complete(String),
    /// The answer is streaming; the caller owns the handle.
    Streaming(StreamingTurn),
}

/// Caller-owned handle to a streaming answer. Cancelling stops the model
/// stream, clears the processing gate, and appends nothing to the chat log -
/// cancellation is never recorded as an error.
pub struct StreamingTurn {
    pub chunks: mpsc::Receiver<StreamChunk>,
    gateway_abort: AbortHandle,
    forward_abort: AbortHandle,
    executor: Arc<PlanExecutor>,
}

impl StreamingTurn {
    pub fn cancel(&self) {
        self.gateway_abort.abort();
        self.forward_abort.abort();
        self.executor.finish_turn();
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Orchestrates one user turn end to end. All collaborators are injected at
/// construction - there are no singletons and no lazy imports.
pub struct PlanExecutor {
    gateway: Arc<ModelGateway>,
    registry: Arc<ActionRegistry>,
    provider: Arc<DataProvider>,
    context: Arc<ContextStore>,
    chat: Arc<ChatLog>,
    trace: Arc<ExecutionTrace>,
    is_processing: AtomicBool,
    phase: Mutex<TurnPhase>,
}

impl PlanExecutor {
    pub fn new(
        gateway: Arc<ModelGateway>,
        registry: Arc<ActionRegistry>,
        provider: Arc<DataProvider>,
        context: Arc<ContextStore>,
        chat: Arc<ChatLog>,
        trace: Arc<ExecutionTrace>,
    ) -> Self {
        Self {
            gateway,
            registry,
            provider,
            context,
            chat,
            trace,
            is_processing: AtomicBool::new(false),
            phase: Mutex::new(TurnPhase::Idle),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> TurnPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: TurnPhase) {
        *self.phase.lock() = phase;
    }

    /// Try to claim the single in-flight turn slot.
    fn begin_turn(&self) -> bool {
        self.is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish_turn(&self) {
        self.set_phase(TurnPhase::Idle);
        self.is_processing.store(false, Ordering::SeqCst);
    }

    /// Process one user message to completion. Infallible by design: every
    /// outcome is a chat-ready sentence, and the reply is also appended to
    /// the chat log as the assistant turn.
    pub async fn respond(&self, user_message: &str) -> String {
        if !self.begin_turn() {
            debug!("Rejecting submission while a turn is in flight");
            return BUSY_REPLY.to_string();
        }

        let reply = match self.run_turn(user_message).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Unexpected turn failure: {e:#}");
                self.trace
                    .record("executor", "turn-error", json!({ "error": e.to_string() }));
                ERROR_REPLY.to_string()
            }
        };

        self.chat.add_assistant(reply.clone());
        self.finish_turn();
        reply
    }

    /// Like [`respond`](Self::respond), but streams the answer when the plan
    /// degenerates to a single direct-answer step. Plans that need data or
    /// action steps still complete synchronously.
    pub async fn respond_streaming(self: Arc<Self>, user_message: &str) -> TurnReply {
        if !self.begin_turn() {
            return TurnReply::Busy(BUSY_REPLY.to_string());
        }

        self.trace.clear();
        self.chat.add_user(user_message);
        let ctx = self.context.snapshot();

        self.set_phase(TurnPhase::Planning);
        let plan = self.generate_plan(&ctx, user_message).await;

        if plan.is_direct_answer() {
            let prompt = answer_prompt(&ctx, &[]);
            match self
                .gateway
                .stream(PromptInput::Text(prompt), Some(user_message))
                .await
            {
                Ok(handle) => {
                    self.set_phase(TurnPhase::Formatting);
                    return TurnReply::Streaming(self.forward_stream(handle));
                }
                Err(e) => {
                    // Streaming endpoint refused; fall back to the
                    // non-streaming path for this turn.
                    warn!("Streaming call failed ({e}), answering non-streaming");
                }
            }
        }

        self.set_phase(TurnPhase::Executing);
        let results = self.execute_plan(&ctx, &plan, user_message).await;

        self.set_phase(TurnPhase::Formatting);
        let reply = self.format_response(&ctx, &plan, &results, user_message).await;
        self.chat.add_assistant(reply.clone());
        self.finish_turn();
        TurnReply::Complete(reply)
    }

    /// Spawn the forwarding task that mirrors gateway chunks to the caller,
    /// accumulates the full text, and performs end-of-turn bookkeeping.
    fn forward_stream(self: Arc<Self>, handle: helix_ai::StreamHandle) -> StreamingTurn {
        let (tx, rx) = mpsc::channel::<StreamChunk>(64);
        let (mut chunks, gateway_abort) = handle.into_parts();
        let executor = Arc::clone(&self);

        let forward = tokio::spawn(async move {
            let mut text = String::new();
            while let Some(chunk) = chunks.recv().await {
                text.push_str(&chunk.content);
                let done = chunk.done;
                let _ = tx.send(chunk).await;
                if done {
                    break;
                }
            }
            if !text.is_empty() {
                executor.chat.add_assistant(text);
            }
            executor.finish_turn();
        });

        StreamingTurn {
            chunks: rx,
            gateway_abort,
            forward_abort: forward.abort_handle(),
            executor: self,
        }
    }

    async fn run_turn(&self, user_message: &str) -> anyhow::Result<String> {
        self.trace.clear();
        self.chat.add_user(user_message);
        let ctx = self.context.snapshot();

        self.set_phase(TurnPhase::Planning);
        let plan = self.generate_plan(&ctx, user_message).await;
        self.trace.record(
            "planner",
            "plan-ready",
            json!({ "steps": plan.steps.len(), "direct": plan.is_direct_answer() }),
        );

        self.set_phase(TurnPhase::Executing);
        let results = self.execute_plan(&ctx, &plan, user_message).await;

        self.set_phase(TurnPhase::Formatting);
        Ok(self.format_response(&ctx, &plan, &results, user_message).await)
    }

    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    /// Ask the model for a plan; any parse failure degrades to the one-step
    /// direct-answer plan instead of erroring.
    async fn generate_plan(&self, ctx: &WorkflowContext, user_message: &str) -> Plan {
        let prompt = self.planning_prompt(ctx);
        let raw = self
            .gateway
            .call(PromptInput::Text(prompt), Some(user_message))
            .await;

        match parse_plan(&raw) {
            Ok(plan) => plan,
            Err(e) => {
                info!("Plan parse failed, degrading to direct answer: {e}");
                self.trace.record(
                    "planner",
                    "plan-parse-failed",
                    json!({ "error": e.to_string() }),
                );
                Plan::direct_answer()
            }
        }
    }

    fn planning_prompt(&self, ctx: &WorkflowContext) -> String {
        let description = narrator::describe(ctx);
        let context_json =
            serde_json::to_string(ctx).unwrap_or_else(|_| "{}".to_string());
        let actions = self.registry.available_actions(ctx);
        let catalog = if actions.is_empty() {
            "(no UI actions are available right now)".to_string()
        } else {
            actions
                .iter()
                .map(|d| format!("- {}: {} (params: {})", d.id, d.description, d.params.join(", ")))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "You are the planning component of a drug-discovery workflow assistant.\n\
             {description}\n\
             Current context: {context_json}\n\
             Available UI actions:\n{catalog}\n\n\
             Produce a JSON plan for the user's request, with this exact shape:\n\
             {{\"steps\":[{{\"type\":\"data|action|llm\",\"action\":\"<query or action id>\",\
             \"params\":{{}},\"critical\":false}}],\
             \"fallbackResponse\":\"<sentence if everything fails>\",\
             \"response\":\"<optional template with {{workflow}} {{currentStep}} {{data.<key>}}>\"}}\n\
             Use \"data\" steps to fetch information, \"action\" steps to drive the UI, \
             and a final \"llm\" step when a written answer is needed. \
             Reply with the JSON only."
        )
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run every step in declared order. Exactly one result per step: after a
    /// failed critical step, the remaining steps are recorded as aborted
    /// without being executed, so no late side effects can occur.
    pub(crate) async fn execute_plan(
        &self,
        ctx: &WorkflowContext,
        plan: &Plan,
        user_message: &str,
    ) -> Vec<StepResult> {
        let mut results: Vec<StepResult> = Vec::with_capacity(plan.steps.len());
        let mut aborted = false;

        for step in &plan.steps {
            if aborted {
                results.push(StepResult::aborted(step.clone()));
                continue;
            }

            let result = self.execute_step(ctx, step, &results, user_message).await;
            self.trace.record(
                "executor",
                "step-complete",
                json!({ "action": step.action, "kind": step.kind, "success": result.success }),
            );

            if !result.success && step.critical {
                warn!("Critical step '{}' failed, aborting remaining steps", step.action);
                aborted = true;
            }
            results.push(result);
        }

        results
    }

    async fn execute_step(
        &self,
        ctx: &WorkflowContext,
        step: &PlanStep,
        prior: &[StepResult],
        user_message: &str,
    ) -> StepResult {
        let params = Value::Object(step.params.clone());
        match step.kind {
            StepKind::Data => {
                // The provider is total - a data step never fails.
                let value = self.provider.get_data(ctx, &step.action, &params);
                StepResult::ok(step.clone(), value)
            }
            StepKind::Action => {
                let outcome = self.registry.execute(ctx, &step.action, &params);
                let output = serde_json::to_value(&outcome).unwrap_or(Value::Null);
                if outcome.success {
                    StepResult::ok(step.clone(), output)
                } else {
                    let mut result = StepResult::failed(
                        step.clone(),
                        outcome.error.unwrap_or_else(|| "action failed".into()),
                    );
                    result.output = Some(output);
                    result
                }
            }
            StepKind::Llm => {
                let prompt = answer_prompt(ctx, prior);
                let text = self
                    .gateway
                    .call(PromptInput::Text(prompt), Some(user_message))
                    .await;
                StepResult::ok(step.clone(), Value::String(text))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Formatting
    // -----------------------------------------------------------------------

    /// Ordered precedence that guarantees the user is never shown raw JSON:
    /// llm answer → response template → actions-completed sentence → data
    /// prose → gateway narration of the results → the plan's fallback.
    async fn format_response(
        &self,
        ctx: &WorkflowContext,
        plan: &Plan,
        results: &[StepResult],
        user_message: &str,
    ) -> String {
        if let Some(text) = results
            .iter()
            .rev()
            .find(|r| r.step.kind == StepKind::Llm && r.success)
            .and_then(|r| r.output.as_ref())
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            return text.to_string();
        }

        let merged = format::merge_data_outputs(results);

        if let Some(template) = &plan.response {
            return format::substitute_template(template, ctx, &merged);
        }

        if results.is_empty() {
            return plan.fallback_response.clone();
        }

        let all_ok = results.iter().all(|r| r.success);
        let has_actions = results.iter().any(|r| r.step.kind == StepKind::Action);
        let has_data = results.iter().any(|r| r.step.kind == StepKind::Data);

        if all_ok && has_actions && !has_data {
            return format::actions_completed_sentence(results);
        }
        if all_ok && has_data && !merged.is_empty() {
            return format::render_data_as_prose(&merged);
        }

        let narration = self.narrate_results(results, user_message).await;
        if !narration.is_empty() && narration != APOLOGY_REPLY {
            return narration;
        }
        plan.fallback_response.clone()
    }

    /// Ask the gateway to explain a partially failed execution in plain
    /// language.
    async fn narrate_results(&self, results: &[StepResult], user_message: &str) -> String {
        let serialized = serde_json::to_string(results).unwrap_or_default();
        let prompt = format!(
            "You are the voice of a workflow assistant. The user asked: \"{user_message}\". \
             The execution trace below shows what succeeded and what failed. \
             Explain the outcome to the user in one or two plain sentences; do not show JSON.\n\
             Trace: {serialized}"
        );
        self.gateway.call(PromptInput::Text(prompt), None).await
    }
}

/// System prompt for an llm answer step: context description plus the
/// already-collected data results.
fn answer_prompt(ctx: &WorkflowContext, prior: &[StepResult]) -> String {
    let description = narrator::describe(ctx);
    let merged = format::merge_data_outputs(prior);
    if merged.is_empty() {
        format!(
            "You are a drug-discovery workflow assistant. {description} \
             Answer the user's question directly and concisely."
        )
    } else {
        let data = serde_json::to_string(&merged).unwrap_or_default();
        format!(
            "You are a drug-discovery workflow assistant. {description} \
             Use this collected data to answer the user's question; \
             reply in prose, never raw JSON.\nData: {data}"
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
