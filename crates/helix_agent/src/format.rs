//! Response formatting helpers - template substitution and natural-language
//! rendering of data objects. Kept separate from the executor so the
//! precedence policy there stays readable.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use helix_core::{narrator, WorkflowContext};

use crate::plan::{StepKind, StepResult};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_.-]+)\}").expect("valid regex"));

/// Merge the top-level keys of every successful data step's output, in step
/// order. Later steps win on key collisions.
pub fn merge_data_outputs(results: &[StepResult]) -> Map<String, Value> {
    let mut merged = Map::new();
    for result in results {
        if result.step.kind != StepKind::Data || !result.success {
            continue;
        }
        if let Some(Value::Object(fields)) = &result.output {
            for (key, value) in fields {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Substitute `{workflow}`, `{currentStep}`, and `{data.<key>}` placeholders.
/// Any placeholder that cannot be resolved becomes the literal `unknown` -
/// the user is never shown raw template syntax.
pub fn substitute_template(
    template: &str,
    ctx: &WorkflowContext,
    data: &Map<String, Value>,
) -> String {
    PLACEHOLDER
        .replace_all(template, |captures: &regex::Captures<'_>| {
            let name = &captures[1];
            resolve_placeholder(name, ctx, data).unwrap_or_else(|| "unknown".to_string())
        })
        .into_owned()
}

fn resolve_placeholder(
    name: &str,
    ctx: &WorkflowContext,
    data: &Map<String, Value>,
) -> Option<String> {
    match name {
        "workflow" => ctx.workflow.as_deref().map(narrator::title_case),
        "currentStep" => ctx.step.as_deref().map(narrator::title_case),
        "section" => ctx.section.as_deref().map(narrator::title_case),
        other => {
            let key = other.strip_prefix("data.")?;
            data.get(key).map(value_to_inline_text)
        }
    }
}

/// A short inline rendering of a value for template substitution.
fn value_to_inline_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_inline_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(fields) => {
            let parts: Vec<String> = fields
                .iter()
                .map(|(k, v)| format!("{}: {}", humanize_key(k), value_to_inline_text(v)))
                .collect();
            parts.join(", ")
        }
        other => other.to_string(),
    }
}

/// Turn a camelCase or kebab-case key into a readable phrase:
/// `leadsProperties` → "leads properties", `sort-order` → "sort order".
pub fn humanize_key(key: &str) -> String {
    let mut words = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        match ch {
            '-' | '_' => words.push(' '),
            c if c.is_uppercase() => {
                if !words.is_empty() && !words.ends_with(' ') {
                    words.push(' ');
                }
                words.extend(c.to_lowercase());
            }
            c => words.push(c),
        }
    }
    words
}

/// Natural-language rendering of a merged data object: keys become readable
/// phrases, arrays are joined or counted, nested objects are summarized one
/// level deep.
pub fn render_data_as_prose(data: &Map<String, Value>) -> String {
    let mut sentences = Vec::new();
    for (key, value) in data {
        let phrase = humanize_key(key);
        let rendered = match value {
            Value::Null => continue,
            Value::Array(items) if items.len() > 3 => {
                format!("{} items", items.len())
            }
            Value::Array(items) => items
                .iter()
                .map(value_to_inline_text)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .take(6)
                    .map(|(k, v)| format!("{} {}", humanize_key(k), summarize_shallow(v)))
                    .collect();
                parts.join(", ")
            }
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if !rendered.is_empty() {
            sentences.push(format!("The {phrase} is {rendered}."));
        }
    }
    if sentences.is_empty() {
        "There is no data to report for this request.".to_string()
    } else {
        sentences.join(" ")
    }
}

fn summarize_shallow(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("({} items)", items.len()),
        Value::Object(fields) => format!("({} fields)", fields.len()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Generic confirmation for action-only plans.
pub fn actions_completed_sentence(results: &[StepResult]) -> String {
    let completed: Vec<String> = results
        .iter()
        .filter(|r| r.step.kind == StepKind::Action && r.success)
        .map(|r| narrator::title_case(&r.step.action))
        .collect();
    match completed.as_slice() {
        [] => "Done.".to_string(),
        [single] => format!("{single} completed."),
        many => format!("{} operations completed.", many.len()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanStep;
    use serde_json::json;

    fn ctx() -> WorkflowContext {
        WorkflowContext {
            workflow: Some("lead-identification".into()),
            step: Some("ligand-design".into()),
            section: None,
            data: Default::default(),
        }
    }

    fn data_result(output: Value) -> StepResult {
        StepResult::ok(
            PlanStep {
                kind: StepKind::Data,
                action: "lead-compounds".into(),
                params: Map::new(),
                critical: false,
            },
            output,
        )
    }

    #[test]
    fn substitutes_context_placeholders() {
        let out = substitute_template("In {workflow}, step {currentStep}.", &ctx(), &Map::new());
        assert_eq!(out, "In Lead Identification, step Ligand Design.");
    }

    #[test]
    fn substitutes_data_placeholders() {
        let mut data = Map::new();
        data.insert("count".into(), json!(4));
        let out = substitute_template("Found {data.count} leads.", &ctx(), &data);
        assert_eq!(out, "Found 4 leads.");
    }

    #[test]
    fn unresolved_placeholder_becomes_unknown() {
        let out = substitute_template("Value: {data.missing} / {nonsense}", &ctx(), &Map::new());
        assert_eq!(out, "Value: unknown / unknown");
    }

    #[test]
    fn merge_skips_failed_and_non_data_steps() {
        let ok = data_result(json!({ "count": 2 }));
        let failed = StepResult::failed(
            PlanStep {
                kind: StepKind::Data,
                action: "statistics".into(),
                params: Map::new(),
                critical: false,
            },
            "boom",
        );
        let merged = merge_data_outputs(&[ok, failed]);
        assert_eq!(merged.get("count"), Some(&json!(2)));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn later_data_steps_win_collisions() {
        let first = data_result(json!({ "count": 1 }));
        let second = data_result(json!({ "count": 9 }));
        let merged = merge_data_outputs(&[first, second]);
        assert_eq!(merged.get("count"), Some(&json!(9)));
    }

    #[test]
    fn humanize_key_handles_cases() {
        assert_eq!(humanize_key("leadsProperties"), "leads properties");
        assert_eq!(humanize_key("sort-order"), "sort order");
        assert_eq!(humanize_key("plain"), "plain");
    }

    #[test]
    fn prose_rendering_joins_arrays_and_counts_long_ones() {
        let mut data = Map::new();
        data.insert("topLeads".into(), json!(["A", "B"]));
        data.insert("allLeads".into(), json!([1, 2, 3, 4, 5]));
        let prose = render_data_as_prose(&data);
        assert!(prose.contains("The top leads is A, B."));
        assert!(prose.contains("5 items"));
    }

    #[test]
    fn prose_rendering_empty_data() {
        let prose = render_data_as_prose(&Map::new());
        assert!(prose.contains("no data"));
    }

    #[test]
    fn action_sentence_singular_and_plural() {
        let single = vec![StepResult::ok(
            PlanStep {
                kind: StepKind::Action,
                action: "navigate-next".into(),
                params: Map::new(),
                critical: false,
            },
            json!({}),
        )];
        assert_eq!(actions_completed_sentence(&single), "Navigate Next completed.");

        let mut both = single.clone();
        both.push(StepResult::ok(
            PlanStep {
                kind: StepKind::Action,
                action: "export-data".into(),
                params: Map::new(),
                critical: false,
            },
            json!({}),
        ));
        assert_eq!(actions_completed_sentence(&both), "2 operations completed.");
    }
}
