//! Append-only execution trace, cleared at the start of each user turn.
//! Purely diagnostic - never read by planning logic.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Which component recorded the entry ("planner", "executor", "gateway" ...).
    pub agent: String,
    pub action: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
pub struct ExecutionTrace {
    entries: Mutex<Vec<TraceEntry>>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, agent: &str, action: &str, payload: Value) {
        self.entries.lock().push(TraceEntry {
            agent: agent.to_string(),
            action: action.to_string(),
            payload,
            timestamp: Utc::now(),
        });
    }

    /// Discards all entries. Called at the start of every user turn.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_in_order_and_clears() {
        let trace = ExecutionTrace::new();
        trace.record("planner", "plan-generated", json!({ "steps": 2 }));
        trace.record("executor", "step-complete", json!({ "index": 0 }));

        let entries = trace.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "plan-generated");
        assert_eq!(entries[1].agent, "executor");

        trace.clear();
        assert!(trace.is_empty());
    }
}
