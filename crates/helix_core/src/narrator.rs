//! Renders the current context as prose and validates step transitions.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::context::WorkflowContext;

/// Ordered step whitelists per workflow. Workflows not listed here are
/// permissive - any transition is allowed.
static WORKFLOW_STEPS: LazyLock<HashMap<&'static str, &'static [&'static str]>> =
    LazyLock::new(|| {
        let mut map: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        map.insert(
            "lead-identification",
            &[
                "project-setup",
                "target-selection",
                "pocket-analysis",
                "ligand-design",
                "lead-evaluation",
            ][..],
        );
        map.insert(
            "target-discovery",
            &[
                "disease-overview",
                "target-selection",
                "target-characteristics",
            ][..],
        );
        map
    });

/// Result of a transition check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub possible: bool,
    pub reason: Option<String>,
}

impl Transition {
    fn allowed() -> Self {
        Self {
            possible: true,
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            possible: false,
            reason: Some(reason.into()),
        }
    }
}

/// Hyphen-split Title Case: `"ligand-design"` → `"Ligand Design"`.
pub fn title_case(identifier: &str) -> String {
    identifier
        .split('-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable sentence chain describing where the user currently is.
/// Clauses for missing fields are omitted entirely.
pub fn describe(ctx: &WorkflowContext) -> String {
    let mut parts = Vec::new();
    if let Some(workflow) = &ctx.workflow {
        parts.push(format!("The user is in the {} workflow", title_case(workflow)));
    }
    if let Some(step) = &ctx.step {
        parts.push(format!("on the {} step", title_case(step)));
    }
    if let Some(section) = &ctx.section {
        parts.push(format!("viewing the {} section", title_case(section)));
    }
    if parts.is_empty() {
        return "The user has not entered a workflow yet.".to_string();
    }
    format!("{}.", parts.join(", "))
}

/// Whether the current workflow allows moving to `target_step`.
/// Consults the static whitelist; workflows without one are permissive.
pub fn can_transition_to_step(ctx: &WorkflowContext, target_step: &str) -> Transition {
    let Some(workflow) = &ctx.workflow else {
        return Transition::denied("No workflow is active");
    };
    match WORKFLOW_STEPS.get(workflow.as_str()) {
        Some(steps) if steps.contains(&target_step) => Transition::allowed(),
        Some(_) => Transition::denied(format!(
            "Step '{target_step}' is not part of the {} workflow",
            title_case(workflow)
        )),
        // No declared whitelist - permissive by default.
        None => Transition::allowed(),
    }
}

/// Declared step order for a workflow, if it has one.
pub fn workflow_steps(workflow: &str) -> Option<&'static [&'static str]> {
    WORKFLOW_STEPS.get(workflow).copied()
}
