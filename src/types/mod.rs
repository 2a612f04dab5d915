//! Type definitions module
//!
//! Turn-boundary types: conversation history, streamed events, citations.

pub mod messages;

// Re-export commonly used types
pub use messages::{recent_history, ConversationTurn, Event, Role, SourceRef, Stage};
