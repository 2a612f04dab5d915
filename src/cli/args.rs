//! Command-line argument parsing for docseeker
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use crate::config::Config;

/// docseeker - ask questions over a document corpus with a local LLM
#[derive(Parser, Debug)]
#[command(name = "docseeker")]
#[command(version)]
#[command(about = "Agentic document retrieval and answer synthesis over local Ollama models", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the chat model
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Override the Ollama host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Override the Ollama port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (answer only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question from a JSON corpus
    Ask {
        /// The question
        #[arg(value_name = "QUESTION")]
        question: String,

        /// JSON corpus with documents, dispatch orders and entities
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// Caller identity used for rate limiting
        #[arg(long, default_value = "cli")]
        caller: String,

        /// Heuristic hints as JSON, e.g. '{"date_from":"2024-01-01","entity":"工務局"}'
        #[arg(long, value_name = "JSON", value_parser = parse_hints)]
        hints: Option<Value>,
    },

    /// Show how a message would be classified (chit-chat or retrieval)
    Classify {
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

/// Hints must be a JSON object
pub fn parse_hints(raw: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err("hints must be a JSON object".to_string())
    }
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Apply command-line overrides on top of the loaded file
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.llm.chat_model = model.clone();
        }
        if let Some(host) = &self.host {
            config.llm.host = host.clone();
        }
        if let Some(port) = self.port {
            config.llm.port = port;
        }
    }
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Status lines while the turn runs
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Stage details and the closing summary
    pub fn show_events(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
