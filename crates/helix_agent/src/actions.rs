//! UI action registry - descriptors, runtime callbacks, and the fallback
//! resolution policy.
//!
//! Descriptors are compile-time tables keyed by (workflow, step). Callbacks
//! are injected by the UI at mount time and may be incomplete at any moment;
//! a missing callback is a recoverable failure, never a crash.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use helix_core::WorkflowContext;

use crate::error::AgentError;

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// An invokable UI operation, declared at compile time.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActionDescriptor {
    pub id: &'static str,
    pub description: &'static str,
    pub params: &'static [&'static str],
}

/// Workflow-wide actions, available on every step of the workflow.
const LEAD_IDENTIFICATION_GLOBAL: &[ActionDescriptor] = &[
    ActionDescriptor {
        id: "navigate-next",
        description: "Move to the next step of the workflow",
        params: &[],
    },
    ActionDescriptor {
        id: "navigate-previous",
        description: "Move back to the previous step of the workflow",
        params: &[],
    },
    ActionDescriptor {
        id: "export-data",
        description: "Export the current step's data",
        params: &["format"],
    },
];

const TARGET_DISCOVERY_GLOBAL: &[ActionDescriptor] = &[
    ActionDescriptor {
        id: "navigate-next",
        description: "Move to the next step of the workflow",
        params: &[],
    },
    ActionDescriptor {
        id: "navigate-previous",
        description: "Move back to the previous step of the workflow",
        params: &[],
    },
];

const LIGAND_DESIGN_STEP: &[ActionDescriptor] = &[
    ActionDescriptor {
        id: "filter-leads",
        description: "Filter the lead compounds by property values",
        params: &["filters"],
    },
    ActionDescriptor {
        id: "sort-leads",
        description: "Sort the lead compounds by a property",
        params: &["sortBy", "sortOrder"],
    },
    ActionDescriptor {
        id: "select-lead",
        description: "Select a lead compound for detailed view",
        params: &["leadId"],
    },
    ActionDescriptor {
        id: "open-structure-viewer",
        description: "Open the 3D structure viewer for the selected lead",
        params: &["leadId"],
    },
];

const LEAD_EVALUATION_STEP: &[ActionDescriptor] = &[
    ActionDescriptor {
        id: "sort-leads",
        description: "Sort the evaluated leads by a property",
        params: &["sortBy", "sortOrder"],
    },
    ActionDescriptor {
        id: "select-lead",
        description: "Select a lead for the evaluation report",
        params: &["leadId"],
    },
];

const POCKET_ANALYSIS_STEP: &[ActionDescriptor] = &[ActionDescriptor {
    id: "open-structure-viewer",
    description: "Open the 3D viewer on the selected binding pocket",
    params: &["pocketId"],
}];

const TARGET_SELECTION_STEP: &[ActionDescriptor] = &[
    ActionDescriptor {
        id: "select-target",
        description: "Select a target protein",
        params: &["targetId"],
    },
    ActionDescriptor {
        id: "sort-targets",
        description: "Sort candidate targets by a score",
        params: &["sortBy", "sortOrder"],
    },
];

fn global_actions(workflow: &str) -> &'static [ActionDescriptor] {
    match workflow {
        "lead-identification" => LEAD_IDENTIFICATION_GLOBAL,
        "target-discovery" => TARGET_DISCOVERY_GLOBAL,
        _ => &[],
    }
}

fn step_actions(workflow: &str, step: &str) -> &'static [ActionDescriptor] {
    match (workflow, step) {
        ("lead-identification", "ligand-design") => LIGAND_DESIGN_STEP,
        ("lead-identification", "lead-evaluation") => LEAD_EVALUATION_STEP,
        ("lead-identification", "pocket-analysis") => POCKET_ANALYSIS_STEP,
        ("lead-identification", "target-selection")
        | ("target-discovery", "target-selection") => TARGET_SELECTION_STEP,
        _ => &[],
    }
}

// ---------------------------------------------------------------------------
// Fallback resolution policy
// ---------------------------------------------------------------------------

/// Category keywords, in fixed precedence order. The first category that
/// appears in the requested id and has at least one available candidate wins.
const FALLBACK_CATEGORIES: &[&str] = &["navigate", "filter", "sort", "select", "export", "view"];

/// Result of heuristic fallback matching.
#[derive(Debug, Clone, Copy)]
pub struct FallbackMatch {
    pub descriptor: &'static ActionDescriptor,
    /// More than one candidate matched the winning category; the first in
    /// declared table order was chosen.
    pub ambiguous: bool,
}

/// Substring-based substitute lookup for an unknown action id.
///
/// This is the one place heuristic matching happens: categories are tried in
/// [`FALLBACK_CATEGORIES`] order against both the requested id and the
/// available ids, and ambiguous matches are flagged rather than silently
/// resolved.
pub fn resolve_fallback(
    requested: &str,
    available: &[&'static ActionDescriptor],
) -> Option<FallbackMatch> {
    for category in FALLBACK_CATEGORIES {
        if !requested.contains(category) {
            continue;
        }
        let candidates: Vec<&&'static ActionDescriptor> = available
            .iter()
            .filter(|d| d.id.contains(category))
            .collect();
        if let Some(first) = candidates.first() {
            return Some(FallbackMatch {
                descriptor: **first,
                ambiguous: candidates.len() > 1,
            });
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Everything the caller needs to retry or explain a failed invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ActionFailureContext {
    pub workflow: Option<String>,
    pub step: Option<String>,
    pub available_actions: Vec<String>,
}

/// Result of [`ActionRegistry::execute`]. Always returned, never thrown.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub action_id: String,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when a fallback action was substituted for the requested id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substituted_for: Option<String>,
    /// The fallback match had more than one candidate.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ambiguous_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ActionFailureContext>,
}

impl ActionOutcome {
    fn success(action_id: &str, params: &Value, message: String) -> Self {
        Self {
            success: true,
            action_id: action_id.to_string(),
            params: params.clone(),
            message: Some(message),
            error: None,
            substituted_for: None,
            ambiguous_match: false,
            context: None,
        }
    }

    fn failure(
        action_id: &str,
        params: &Value,
        error: &AgentError,
        context: ActionFailureContext,
    ) -> Self {
        Self {
            success: false,
            action_id: action_id.to_string(),
            params: params.clone(),
            message: None,
            error: Some(error.to_string()),
            substituted_for: None,
            ambiguous_match: false,
            context: Some(context),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A UI-side handler for one action id.
pub type ActionCallback = Arc<dyn Fn(&Value) -> Result<String, String> + Send + Sync>;

/// Holds the live callback map. The registry itself carries no workflow
/// state - descriptors are derived from the context on every call.
#[derive(Default)]
pub struct ActionRegistry {
    callbacks: RwLock<HashMap<String, ActionCallback>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of workflow-wide and step-scoped descriptors for the current
    /// context. Empty when no workflow is active.
    pub fn available_actions(&self, ctx: &WorkflowContext) -> Vec<&'static ActionDescriptor> {
        let Some(workflow) = &ctx.workflow else {
            return Vec::new();
        };
        let mut actions: Vec<&'static ActionDescriptor> =
            global_actions(workflow).iter().collect();
        if let Some(step) = &ctx.step {
            actions.extend(step_actions(workflow, step).iter());
        }
        actions
    }

    /// Additive merge into the live callback map; existing entries are kept
    /// unless the new map overrides the same id.
    pub fn register_callbacks(&self, map: HashMap<String, ActionCallback>) {
        let mut callbacks = self.callbacks.write();
        for (id, callback) in map {
            callbacks.insert(id, callback);
        }
    }

    pub fn register_callback<F>(&self, id: &str, callback: F)
    where
        F: Fn(&Value) -> Result<String, String> + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .insert(id.to_string(), Arc::new(callback));
    }

    pub fn has_callback(&self, id: &str) -> bool {
        self.callbacks.read().contains_key(id)
    }

    /// Invoke an action by id. Unknown ids go through the fallback policy;
    /// a descriptor without a registered callback is a distinct, recoverable
    /// failure. Invoking a resolved action calls exactly one callback.
    pub fn execute(&self, ctx: &WorkflowContext, id: &str, params: &Value) -> ActionOutcome {
        let available = self.available_actions(ctx);
        let failure_context = || ActionFailureContext {
            workflow: ctx.workflow.clone(),
            step: ctx.step.clone(),
            available_actions: available.iter().map(|d| d.id.to_string()).collect(),
        };

        let exact = available.iter().find(|d| d.id == id).copied();
        let (descriptor, substituted, ambiguous) = match exact {
            Some(d) => (d, None, false),
            None => match resolve_fallback(id, &available) {
                Some(m) => {
                    info!(
                        "Action '{id}' not found; substituting fallback '{}'{}",
                        m.descriptor.id,
                        if m.ambiguous { " (ambiguous match)" } else { "" }
                    );
                    (m.descriptor, Some(id.to_string()), m.ambiguous)
                }
                None => {
                    warn!("No action or fallback matched '{id}'");
                    return ActionOutcome::failure(
                        id,
                        params,
                        &AgentError::ActionNotFound(id.to_string()),
                        failure_context(),
                    );
                }
            },
        };

        let callback = self.callbacks.read().get(descriptor.id).cloned();
        let Some(callback) = callback else {
            return ActionOutcome::failure(
                descriptor.id,
                params,
                &AgentError::CallbackNotRegistered(descriptor.id.to_string()),
                failure_context(),
            );
        };

        match callback(params) {
            Ok(message) => {
                let mut outcome = ActionOutcome::success(descriptor.id, params, message);
                outcome.substituted_for = substituted;
                outcome.ambiguous_match = ambiguous;
                outcome
            }
            Err(error) => ActionOutcome::failure(
                descriptor.id,
                params,
                &AgentError::StepExecution(error),
                failure_context(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(workflow: Option<&str>, step: Option<&str>) -> WorkflowContext {
        WorkflowContext {
            workflow: workflow.map(Into::into),
            step: step.map(Into::into),
            section: None,
            data: Default::default(),
        }
    }

    #[test]
    fn no_workflow_means_no_actions() {
        let registry = ActionRegistry::new();
        assert!(registry.available_actions(&ctx(None, None)).is_empty());
    }

    #[test]
    fn available_is_union_of_global_and_step_scoped() {
        let registry = ActionRegistry::new();
        let actions =
            registry.available_actions(&ctx(Some("lead-identification"), Some("ligand-design")));
        let ids: Vec<&str> = actions.iter().map(|d| d.id).collect();
        assert!(ids.contains(&"navigate-next"));
        assert!(ids.contains(&"filter-leads"));
        // Step-scoped actions from other steps are absent.
        assert!(!ids.contains(&"select-target"));
    }

    #[test]
    fn execute_invokes_callback_exactly_once() {
        let registry = ActionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.register_callback("navigate-next", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("Moved to the next step".into())
        });

        let outcome = registry.execute(
            &ctx(Some("lead-identification"), Some("ligand-design")),
            "navigate-next",
            &json!({}),
        );
        assert!(outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("Moved to the next step"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_callback_is_structured_failure() {
        let registry = ActionRegistry::new();
        let outcome = registry.execute(
            &ctx(Some("lead-identification"), Some("ligand-design")),
            "navigate-next",
            &json!({}),
        );
        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert!(error.contains("not registered"), "error was: {error}");
        // The caller gets enough context to retry or explain.
        let context = outcome.context.unwrap();
        assert_eq!(context.workflow.as_deref(), Some("lead-identification"));
        assert!(!context.available_actions.is_empty());
    }

    #[test]
    fn unknown_id_resolves_through_fallback_category() {
        let registry = ActionRegistry::new();
        registry.register_callback("filter-leads", |_| Ok("Filtered".into()));

        let outcome = registry.execute(
            &ctx(Some("lead-identification"), Some("ligand-design")),
            "filter-by-molecular-weight",
            &json!({ "filters": { "mw": { "max": 500.0 } } }),
        );
        assert!(outcome.success);
        assert_eq!(outcome.action_id, "filter-leads");
        assert_eq!(
            outcome.substituted_for.as_deref(),
            Some("filter-by-molecular-weight")
        );
    }

    #[test]
    fn unmatched_id_reports_action_not_found() {
        let registry = ActionRegistry::new();
        let outcome = registry.execute(
            &ctx(Some("lead-identification"), Some("ligand-design")),
            "launch-rocket",
            &json!({}),
        );
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not available"));
    }

    #[test]
    fn callback_error_becomes_failed_outcome() {
        let registry = ActionRegistry::new();
        registry.register_callback("navigate-next", |_| Err("route blocked".into()));
        let outcome = registry.execute(
            &ctx(Some("lead-identification"), None),
            "navigate-next",
            &json!({}),
        );
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("route blocked"));
    }

    #[test]
    fn fallback_precedence_is_category_order() {
        // "navigate-and-sort" mentions both navigate and sort; navigate is
        // earlier in the category order so it must win.
        let available = ActionRegistry::new()
            .available_actions(&ctx(Some("lead-identification"), Some("ligand-design")));
        let m = resolve_fallback("navigate-and-sort", &available).unwrap();
        assert_eq!(m.descriptor.id, "navigate-next");
        // Both navigate-next and navigate-previous match: flagged ambiguous.
        assert!(m.ambiguous);
    }

    #[test]
    fn fallback_single_candidate_is_unambiguous() {
        let available = ActionRegistry::new()
            .available_actions(&ctx(Some("lead-identification"), Some("ligand-design")));
        let m = resolve_fallback("sort-by-logp", &available).unwrap();
        assert_eq!(m.descriptor.id, "sort-leads");
        assert!(!m.ambiguous);
    }

    #[test]
    fn register_callbacks_is_additive() {
        let registry = ActionRegistry::new();
        registry.register_callback("navigate-next", |_| Ok("a".into()));

        let mut map: HashMap<String, ActionCallback> = HashMap::new();
        map.insert("sort-leads".into(), Arc::new(|_: &Value| Ok("b".into())));
        registry.register_callbacks(map);

        assert!(registry.has_callback("navigate-next"));
        assert!(registry.has_callback("sort-leads"));
    }
}
