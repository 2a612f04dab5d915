//! Planning system
//!
//! Produces the tool plan for a question, judges the results of a round and
//! emits at most one corrective re-plan.

pub mod hints;
pub mod parser;
pub mod planner;
pub mod prompts;
pub mod replanner;
pub mod types;

// Re-export commonly used types
pub use hints::{detect_hints, TurnHints};
pub use parser::parse_plan;
pub use planner::{build_fallback_plan, build_forced_calls, merge_hints_into_plan, Planner};
pub use replanner::{assess_results, Replanner};
pub use types::{CorrectionStrategy, Evaluation, InsufficiencyPattern, Plan, PlanParseError, Replan};
