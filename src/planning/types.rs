//! Core data structures for the planning system
//!
//! A `Plan` is the ordered list of tool calls for one question. After the
//! first execution round the results are judged; an insufficient round is
//! classified into a `InsufficiencyPattern` and answered with exactly one
//! `CorrectionStrategy`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::tools::types::{ToolCall, ToolName};

/// Ordered tool calls chosen for one question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl Plan {
    pub fn new(reasoning: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            reasoning: reasoning.into(),
            tool_calls,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tool_calls.len()
    }

    /// Whether any call targets one of `tools`
    pub fn addresses(&self, tools: &[ToolName]) -> bool {
        self.tool_calls
            .iter()
            .any(|call| call.tool_name().is_some_and(|t| tools.contains(&t)))
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_calls.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Why model output could not be read as a plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanParseError {
    #[error("planner returned empty output")]
    Empty,

    #[error("no JSON object found in planner output")]
    NoJson,

    #[error("planner JSON does not match the plan shape: {0}")]
    InvalidShape(String),
}

/// Failure pattern detected in a round of tool results
#[derive(Debug, Clone, PartialEq)]
pub enum InsufficiencyPattern {
    /// No call succeeded with any data
    NoResults { failed: usize, empty: usize },

    /// Documents came back but none reaches the relevance floor
    LowRelevance { best_score: f32 },

    /// An LLM judgment said the results do not answer the question
    Judged { reason: String },
}

impl fmt::Display for InsufficiencyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsufficiencyPattern::NoResults { failed, empty } => {
                write!(f, "no results ({} failed, {} empty)", failed, empty)
            }
            InsufficiencyPattern::LowRelevance { best_score } => {
                write!(f, "low relevance (best {:.2})", best_score)
            }
            InsufficiencyPattern::Judged { reason } => write!(f, "judged insufficient: {}", reason),
        }
    }
}

/// Verdict on one round of tool results
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub sufficient: bool,
    pub pattern: Option<InsufficiencyPattern>,
}

impl Evaluation {
    pub fn sufficient() -> Self {
        Self {
            sufficient: true,
            pattern: None,
        }
    }

    pub fn insufficient(pattern: InsufficiencyPattern) -> Self {
        Self {
            sufficient: false,
            pattern: Some(pattern),
        }
    }
}

/// The single corrective adjustment applied to a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStrategy {
    /// Widen a too-narrow date filter
    BroadenDates,
    /// Drop an over-specific sender/entity filter
    DropEntityFilter,
    /// Keyword-only or vector-only search becomes hybrid
    SwitchToHybrid,
    /// Widen terms through synonyms and entity aliases
    ExpandTerms,
    /// Entity lookups failed; use generic document search instead
    FallbackTool,
}

impl CorrectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionStrategy::BroadenDates => "broaden_dates",
            CorrectionStrategy::DropEntityFilter => "drop_entity_filter",
            CorrectionStrategy::SwitchToHybrid => "switch_to_hybrid",
            CorrectionStrategy::ExpandTerms => "expand_terms",
            CorrectionStrategy::FallbackTool => "fallback_tool",
        }
    }
}

impl fmt::Display for CorrectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Corrective round chosen after an insufficient evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Replan {
    pub strategy: CorrectionStrategy,
    pub pattern: InsufficiencyPattern,
    pub plan: Plan,
}
