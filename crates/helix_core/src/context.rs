//! Workflow context - the current snapshot of what the UI is showing.
//!
//! The UI layer mutates the store on every navigation or state change; the
//! planning components only ever read immutable snapshots. No history is
//! kept beyond the current state.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// On-screen domain data supplied by the UI.
///
/// Known fields are typed so consumers that need e.g. `lead_data` get
/// compile-time guarantees; anything workflow-specific lands in `extra`.
/// JSON field names use camelCase to match the UI contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disease_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    /// Lead-compound payload: `{ "leads": [...] }`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_data: Option<Value>,
    /// Per-lead property records used for filtering and sorting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leads_properties: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pocket_data: Option<Value>,
    /// Residual extension map for fields the core does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Immutable snapshot of the current workflow position and data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowContext {
    pub workflow: Option<String>,
    pub step: Option<String>,
    pub section: Option<String>,
    pub data: ContextData,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Thread-safe holder for the current [`WorkflowContext`].
///
/// Writers are the UI layer only; the single in-flight turn invariant keeps
/// interleaving out, but the lock makes a concurrent caller safe anyway.
#[derive(Default)]
pub struct ContextStore {
    inner: RwLock<WorkflowContext>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_workflow(&self, workflow: Option<String>) {
        self.inner.write().workflow = workflow;
    }

    pub fn set_step(&self, step: Option<String>) {
        self.inner.write().step = step;
    }

    pub fn set_section(&self, section: Option<String>) {
        self.inner.write().section = section;
    }

    /// Merge-patch the data bag with a partial JSON object. Known camelCase
    /// keys update their typed field; unknown keys land in `extra`. A key
    /// mapped to `null` clears the field. The bag is never replaced wholesale.
    pub fn update_data(&self, partial: Value) {
        let Value::Object(entries) = partial else {
            return;
        };
        let mut guard = self.inner.write();
        let data = &mut guard.data;
        for (key, value) in entries {
            match key.as_str() {
                "projectId" => data.project_id = as_opt_string(value),
                "projectName" => data.project_name = as_opt_string(value),
                "diseaseName" => data.disease_name = as_opt_string(value),
                "targetName" => data.target_name = as_opt_string(value),
                "leadData" => data.lead_data = non_null(value),
                "leadsProperties" => {
                    data.leads_properties = match value {
                        Value::Array(items) => Some(items),
                        _ => None,
                    }
                }
                "pocketData" => data.pocket_data = non_null(value),
                _ => {
                    if value.is_null() {
                        data.extra.remove(&key);
                    } else {
                        data.extra.insert(key, value);
                    }
                }
            }
        }
    }

    /// Owned immutable snapshot of the current context.
    pub fn snapshot(&self) -> WorkflowContext {
        self.inner.read().clone()
    }
}

fn as_opt_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn non_null(value: Value) -> Option<Value> {
    if value.is_null() { None } else { Some(value) }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
