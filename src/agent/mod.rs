//! Turn orchestration
//!
//! State machine, chit-chat short-circuit, per-caller rate limiting and the
//! orchestrator that drives one question to a streamed answer.

pub mod chitchat;
pub mod orchestrator;
pub mod rate_limit;
pub mod state;

pub use chitchat::{classify, ChitchatDecision, ChitchatKind, ChitchatRule};
pub use orchestrator::{collect_sources, Orchestrator, TurnRequest};
pub use rate_limit::RateLimiter;
pub use state::{TurnEvent, TurnState, TurnStateMachine, MAX_REPLANS};
