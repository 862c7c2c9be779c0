pub mod actions;
pub mod data;
pub mod error;
pub mod executor;
pub mod format;
pub mod plan;

pub use actions::{ActionCallback, ActionDescriptor, ActionOutcome, ActionRegistry};
pub use data::DataProvider;
pub use error::AgentError;
pub use executor::{PlanExecutor, StreamingTurn, TurnPhase, TurnReply, BUSY_REPLY};
pub use plan::{parse_plan, Plan, PlanStep, StepKind, StepResult};
