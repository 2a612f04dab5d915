//! Retrieval tool catalogue
//!
//! - Closed catalogue of six read-only tools (`ToolName`)
//! - Typed argument parsing before any store is touched (`ToolRequest`)
//! - Concurrent executor with per-call timeout and plan-order results
//! - JSON-schema registry rendered into the planner prompt

pub mod executor;
pub mod implementations;
pub mod registry;
pub mod types;

pub use executor::{ToolExecutor, MAX_PARALLEL_OPERATIONS};
pub use registry::{ToolRegistry, ToolSchema};
pub use types::{ToolCall, ToolContext, ToolName, ToolOutput, ToolRequest, ToolResult};
