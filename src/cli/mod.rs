//! CLI module for docseeker
//!
//! Argument parsing and terminal rendering of the turn event stream.

pub mod args;
pub mod render;

pub use args::{parse_hints, Args, Commands, Verbosity};
pub use render::EventPrinter;
