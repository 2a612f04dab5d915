//! docseeker - agentic retrieval-and-synthesis core
//!
//! Turns a natural-language question into a streamed, cited answer:
//! chit-chat short-circuit, per-caller rate limiting, LLM tool planning,
//! bounded-concurrency tool execution over document stores, hybrid
//! reranking, one corrective replan, and sanitized answer synthesis.
//!
//! # Architecture
//!
//! - `agent`: turn state machine and orchestrator (event stream entry point)
//! - `planning`: plan generation, hint merging, sufficiency and correction
//! - `tools`: fixed tool catalogue, typed requests, executor
//! - `rag`: retrieval engine, reranking, context assembly
//! - `embedding`, `expansion`, `store`, `llm`: outbound collaborators
//! - `synthesis`: answer prompt and output sanitizing

pub mod errors;
pub mod types;
pub mod config;

pub use errors::{AgentError, Result};

pub mod agent;
pub mod embedding;
pub mod expansion;
pub mod llm;
pub mod planning;
pub mod rag;
pub mod store;
pub mod synthesis;
pub mod tools;

pub mod cli;
pub mod telemetry;
