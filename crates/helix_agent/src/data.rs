//! Data provider - answers named data queries from the context's data bag.
//!
//! Designed to be total: any query type with any params resolves to a JSON
//! value. Unknown query types are routed by substring intent inference, and
//! internal failures are converted to an `{error, fallbackData, queryType}`
//! object tied to the current workflow step. Downstream consumers never see
//! an exception from here.

use serde_json::{json, Map, Value};
use tracing::debug;

use helix_core::{narrator, WorkflowContext};

/// Fixed inference order for unrecognized query names. Earlier entries win.
const INTENT_ROUTES: &[(&[&str], &str)] = &[
    (&["project"], "available-projects"),
    (&["characteristic", "analysis"], "characteristics"),
    (&["lead", "compound"], "lead-compounds"),
];

#[derive(Default)]
pub struct DataProvider;

impl DataProvider {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a named query. Never fails: errors surface as a structured
    /// fallback object, not as an `Err`.
    pub fn get_data(&self, ctx: &WorkflowContext, query_type: &str, params: &Value) -> Value {
        match self.dispatch(ctx, query_type, params) {
            Ok(value) => value,
            Err(error) => {
                debug!("Query '{query_type}' degraded to fallback: {error}");
                json!({
                    "error": error,
                    "fallbackData": step_fallback_text(ctx),
                    "queryType": query_type,
                })
            }
        }
    }

    fn dispatch(
        &self,
        ctx: &WorkflowContext,
        query_type: &str,
        params: &Value,
    ) -> Result<Value, String> {
        match query_type {
            "project-info" => Ok(project_info(ctx)),
            "current-step-data" => Ok(current_step_data(ctx)),
            "lead-compounds" => lead_compounds(ctx, params),
            "filter-options" => Ok(filter_options(ctx)),
            "statistics" => Ok(statistics(ctx)),
            "available-projects" => Ok(available_projects(ctx)),
            "characteristics" => Ok(characteristics(ctx)),
            other => match infer_intent(other) {
                Some(known) => {
                    debug!("Inferred query '{known}' from unknown type '{other}'");
                    self.dispatch(ctx, known, params)
                }
                None => Ok(context_summary(ctx)),
            },
        }
    }
}

/// Substring intent inference for unknown query names, in fixed order.
fn infer_intent(query_type: &str) -> Option<&'static str> {
    let lower = query_type.to_lowercase();
    INTENT_ROUTES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, route)| *route)
}

fn step_fallback_text(ctx: &WorkflowContext) -> String {
    match &ctx.step {
        Some(step) => format!(
            "No data is available for the {} step yet.",
            narrator::title_case(step)
        ),
        None => "No workflow data is available yet.".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Query handlers
// ---------------------------------------------------------------------------

fn project_info(ctx: &WorkflowContext) -> Value {
    let data = &ctx.data;
    json!({
        "projectId": data.project_id.clone().unwrap_or_else(|| "demo-project".into()),
        "projectName": data.project_name.clone().unwrap_or_else(|| "Demo Project".into()),
        "diseaseName": data.disease_name.clone().unwrap_or_else(|| "Not selected".into()),
        "targetName": data.target_name.clone().unwrap_or_else(|| "Not selected".into()),
    })
}

fn current_step_data(ctx: &WorkflowContext) -> Value {
    let mut keys: Vec<&str> = Vec::new();
    if ctx.data.lead_data.is_some() {
        keys.push("leadData");
    }
    if ctx.data.leads_properties.is_some() {
        keys.push("leadsProperties");
    }
    if ctx.data.pocket_data.is_some() {
        keys.push("pocketData");
    }
    let extra_keys: Vec<&String> = ctx.data.extra.keys().collect();
    json!({
        "workflow": ctx.workflow,
        "step": ctx.step,
        "section": ctx.section,
        "description": narrator::describe(ctx),
        "dataKeys": keys,
        "extraKeys": extra_keys,
    })
}

fn lead_records(ctx: &WorkflowContext) -> Vec<Value> {
    if let Some(properties) = &ctx.data.leads_properties {
        return properties.clone();
    }
    if let Some(leads) = ctx
        .data
        .lead_data
        .as_ref()
        .and_then(|d| d.get("leads"))
        .and_then(Value::as_array)
    {
        return leads.clone();
    }
    placeholder_leads()
}

/// Synthetic placeholder leads used when the UI has not supplied any.
fn placeholder_leads() -> Vec<Value> {
    vec![
        json!({ "id": "lead-1", "name": "Compound A", "mw": 342.4, "logp": 2.1, "hbd": 2, "hba": 5 }),
        json!({ "id": "lead-2", "name": "Compound B", "mw": 398.9, "logp": 3.4, "hbd": 1, "hba": 6 }),
        json!({ "id": "lead-3", "name": "Compound C", "mw": 475.2, "logp": 4.0, "hbd": 3, "hba": 7 }),
    ]
}

fn lead_compounds(ctx: &WorkflowContext, params: &Value) -> Result<Value, String> {
    let mut leads = lead_records(ctx);
    let total = leads.len();

    let mut filtered = false;
    if let Some(filters) = params.get("filters") {
        let Value::Object(filters) = filters else {
            return Err("'filters' must be an object of field predicates".into());
        };
        leads = filter_records(leads, filters);
        filtered = true;
    }

    let sort_key = params.get("sortBy").and_then(Value::as_str);
    if let Some(key) = sort_key {
        let descending = params
            .get("sortOrder")
            .and_then(Value::as_str)
            .is_some_and(|o| o.eq_ignore_ascii_case("desc"));
        sort_records(&mut leads, key, descending);
    }

    Ok(json!({
        "leads": leads,
        "count": leads.len(),
        "total": total,
        "filtered": filtered,
        "sortedBy": sort_key,
    }))
}

/// Keep a record only if it satisfies every supplied field predicate.
/// A predicate is either a `{min,max}` range or an exact-match scalar; a
/// record missing the field is excluded.
pub(crate) fn filter_records(records: Vec<Value>, filters: &Map<String, Value>) -> Vec<Value> {
    records
        .into_iter()
        .filter(|record| {
            filters.iter().all(|(field, predicate)| {
                let Some(value) = record.get(field) else {
                    return false;
                };
                match predicate {
                    Value::Object(range)
                        if range.contains_key("min") || range.contains_key("max") =>
                    {
                        let Some(number) = value.as_f64() else {
                            return false;
                        };
                        let min = range.get("min").and_then(Value::as_f64);
                        let max = range.get("max").and_then(Value::as_f64);
                        min.is_none_or(|m| number >= m) && max.is_none_or(|m| number <= m)
                    }
                    scalar => values_equal(value, scalar),
                }
            })
        })
        .collect()
}

/// Exact-match comparison with numeric coercion (3 == 3.0).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Single-key numeric sort. `sort_by` is stable, so ties keep input order.
/// Records without a numeric value for the key sort last.
pub(crate) fn sort_records(records: &mut [Value], key: &str, descending: bool) {
    records.sort_by(|a, b| {
        let left = a.get(key).and_then(Value::as_f64);
        let right = b.get(key).and_then(Value::as_f64);
        let ordering = match (left, right) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        if descending && left.is_some() && right.is_some() {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn filter_options(ctx: &WorkflowContext) -> Value {
    let leads = lead_records(ctx);
    let mut options = Map::new();
    for lead in &leads {
        let Value::Object(fields) = lead else {
            continue;
        };
        for (field, value) in fields {
            let Some(number) = value.as_f64() else {
                continue;
            };
            let entry = options
                .entry(field.clone())
                .or_insert_with(|| json!({ "min": number, "max": number }));
            let min = entry["min"].as_f64().unwrap_or(number).min(number);
            let max = entry["max"].as_f64().unwrap_or(number).max(number);
            *entry = json!({ "min": min, "max": max });
        }
    }
    json!({ "fields": options, "recordCount": leads.len() })
}

fn statistics(ctx: &WorkflowContext) -> Value {
    let leads = lead_records(ctx);
    let mut sums: Map<String, Value> = Map::new();
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for lead in &leads {
        let Value::Object(fields) = lead else {
            continue;
        };
        for (field, value) in fields {
            let Some(number) = value.as_f64() else {
                continue;
            };
            let sum = sums.get(field).and_then(Value::as_f64).unwrap_or(0.0);
            sums.insert(field.clone(), json!(sum + number));
            *counts.entry(field.clone()).or_insert(0) += 1;
        }
    }

    let mut properties = Map::new();
    for (field, sum) in &sums {
        let count = counts.get(field).copied().unwrap_or(0);
        if count > 0 {
            let mean = sum.as_f64().unwrap_or(0.0) / count as f64;
            properties.insert(field.clone(), json!({ "mean": mean, "count": count }));
        }
    }

    json!({ "count": leads.len(), "properties": properties })
}

fn available_projects(ctx: &WorkflowContext) -> Value {
    if let Some(projects) = ctx.data.extra.get("projects").and_then(Value::as_array) {
        return json!({ "projects": projects, "count": projects.len() });
    }
    // Synthetic placeholder so the query never comes back empty-handed.
    let placeholder = vec![
        json!({ "id": "demo-project", "name": "Demo Project", "status": "active" }),
        json!({ "id": "archived-example", "name": "Archived Example", "status": "archived" }),
    ];
    json!({ "projects": placeholder, "count": placeholder.len(), "placeholder": true })
}

fn characteristics(ctx: &WorkflowContext) -> Value {
    if let Some(list) = ctx
        .data
        .extra
        .get("characteristics")
        .and_then(Value::as_array)
    {
        return json!({ "characteristics": list });
    }
    if let Some(pocket) = &ctx.data.pocket_data {
        return json!({ "characteristics": [pocket] });
    }
    json!({
        "characteristics": [],
        "note": step_fallback_text(ctx),
    })
}

fn context_summary(ctx: &WorkflowContext) -> Value {
    json!({
        "summary": narrator::describe(ctx),
        "workflow": ctx.workflow,
        "step": ctx.step,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::ContextStore;

    fn lead_ctx() -> WorkflowContext {
        let store = ContextStore::new();
        store.set_workflow(Some("lead-identification".into()));
        store.set_step(Some("ligand-design".into()));
        store.update_data(json!({
            "leadsProperties": [
                { "id": "l1", "mw": 300.0, "logp": 2.0 },
                { "id": "l2", "mw": 600.0, "logp": -1.0 },
            ]
        }));
        store.snapshot()
    }

    #[test]
    fn range_filter_keeps_records_inside_bounds() {
        let filters = json!({ "mw": { "min": 0.0, "max": 500.0 } });
        let Value::Object(filters) = filters else { unreachable!() };
        let kept = filter_records(
            vec![json!({ "mw": 300.0 }), json!({ "mw": 600.0 })],
            &filters,
        );
        assert_eq!(kept, vec![json!({ "mw": 300.0 })]);
    }

    #[test]
    fn missing_field_excludes_record() {
        let filters = json!({ "mw": { "min": 0.0 } });
        let Value::Object(filters) = filters else { unreachable!() };
        let kept = filter_records(vec![json!({ "logp": 1.0 })], &filters);
        assert!(kept.is_empty());
    }

    #[test]
    fn exact_scalar_filter_matches_with_numeric_coercion() {
        let filters = json!({ "hbd": 2 });
        let Value::Object(filters) = filters else { unreachable!() };
        let kept = filter_records(
            vec![json!({ "hbd": 2.0 }), json!({ "hbd": 3 })],
            &filters,
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn all_predicates_must_hold() {
        let filters = json!({ "mw": { "max": 500.0 }, "logp": { "min": 3.0 } });
        let Value::Object(filters) = filters else { unreachable!() };
        let kept = filter_records(
            vec![
                json!({ "mw": 300.0, "logp": 2.0 }),
                json!({ "mw": 400.0, "logp": 3.5 }),
            ],
            &filters,
        );
        assert_eq!(kept, vec![json!({ "mw": 400.0, "logp": 3.5 })]);
    }

    #[test]
    fn sort_descending_then_ascending() {
        let mut records = vec![json!({ "logp": 2.0 }), json!({ "logp": -1.0 })];
        sort_records(&mut records, "logp", true);
        assert_eq!(records, vec![json!({ "logp": 2.0 }), json!({ "logp": -1.0 })]);
        sort_records(&mut records, "logp", false);
        assert_eq!(records, vec![json!({ "logp": -1.0 }), json!({ "logp": 2.0 })]);
    }

    #[test]
    fn lead_compounds_applies_filter_and_sort() {
        let provider = DataProvider::new();
        let result = provider.get_data(
            &lead_ctx(),
            "lead-compounds",
            &json!({ "filters": { "mw": { "max": 500.0 } }, "sortBy": "logp", "sortOrder": "desc" }),
        );
        assert_eq!(result["count"], json!(1));
        assert_eq!(result["total"], json!(2));
        assert_eq!(result["leads"][0]["id"], json!("l1"));
    }

    #[test]
    fn bad_filters_shape_degrades_to_fallback_object() {
        let provider = DataProvider::new();
        let result = provider.get_data(
            &lead_ctx(),
            "lead-compounds",
            &json!({ "filters": "everything" }),
        );
        assert!(result.get("error").is_some());
        assert_eq!(result["queryType"], json!("lead-compounds"));
        assert!(
            result["fallbackData"]
                .as_str()
                .unwrap()
                .contains("Ligand Design")
        );
    }

    #[test]
    fn unknown_query_is_inferred_by_substring() {
        let provider = DataProvider::new();
        let result = provider.get_data(&lead_ctx(), "show-me-compound-list", &json!({}));
        // Routed to lead-compounds.
        assert!(result.get("leads").is_some());

        let result = provider.get_data(&lead_ctx(), "project-overview-thing", &json!({}));
        assert!(result.get("projects").is_some());

        let result = provider.get_data(&lead_ctx(), "pocket-analysis-details", &json!({}));
        assert!(result.get("characteristics").is_some());
    }

    #[test]
    fn fully_unknown_query_returns_context_summary() {
        let provider = DataProvider::new();
        let result = provider.get_data(&lead_ctx(), "weather-report", &json!({}));
        assert!(
            result["summary"]
                .as_str()
                .unwrap()
                .contains("Lead Identification")
        );
    }

    #[test]
    fn absent_leads_fall_back_to_placeholders() {
        let provider = DataProvider::new();
        let ctx = WorkflowContext::default();
        let result = provider.get_data(&ctx, "lead-compounds", &json!({}));
        assert!(result["count"].as_u64().unwrap() > 0);
    }

    #[test]
    fn project_info_uses_placeholders_when_absent() {
        let provider = DataProvider::new();
        let result = provider.get_data(&WorkflowContext::default(), "project-info", &json!({}));
        assert_eq!(result["projectName"], json!("Demo Project"));
    }

    #[test]
    fn statistics_reports_means() {
        let provider = DataProvider::new();
        let result = provider.get_data(&lead_ctx(), "statistics", &json!({}));
        assert_eq!(result["count"], json!(2));
        let mw_mean = result["properties"]["mw"]["mean"].as_f64().unwrap();
        assert!((mw_mean - 450.0).abs() < 1e-9);
    }

    #[test]
    fn filter_options_reports_field_ranges() {
        let provider = DataProvider::new();
        let result = provider.get_data(&lead_ctx(), "filter-options", &json!({}));
        assert_eq!(result["fields"]["mw"]["min"], json!(300.0));
        assert_eq!(result["fields"]["mw"]["max"], json!(600.0));
    }
}
