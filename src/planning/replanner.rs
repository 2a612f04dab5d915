//! Result evaluation and single-shot correction
//!
//! After the first execution round the results are judged. An insufficient
//! round is classified (`InsufficiencyPattern`) and answered with the first
//! applicable correction, in this order:
//!
//! 1. broaden dates: a date-filtered call came back empty
//! 2. drop entity filter: a sender/assignee-filtered call came back empty
//! 3. switch to hybrid: a search ran keyword-only or vector-only
//! 4. fallback tool: entity lookups failed or found nothing
//! 5. expand terms: widen the search terms through the `QueryExpander`
//!
//! The caller runs at most one corrective round per turn.

use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::expansion::QueryExpander;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TaskType};
use crate::planning::hints::{broaden_range, format_date};
use crate::planning::prompts::{parse_verdict, sufficiency_prompt};
use crate::planning::types::{CorrectionStrategy, Evaluation, InsufficiencyPattern, Plan, Replan};
use crate::store::parse_date;
use crate::tools::implementations::split_terms;
use crate::tools::types::{ToolCall, ToolName, ToolOutput, ToolResult};

/// Tools whose arguments accept `date_from` / `date_to`
const DATE_TOOLS: [ToolName; 3] = [
    ToolName::SearchDocuments,
    ToolName::SearchDispatchOrders,
    ToolName::GetStatistics,
];

/// Judges tool results and picks a correction
pub struct Replanner {
    expander: Arc<QueryExpander>,
    /// Present when the second-opinion LLM judgment is enabled
    judge: Option<Arc<dyn LlmProvider>>,
    min_relevance: f32,
    date_broaden_days: i64,
}

impl Replanner {
    pub fn new(expander: Arc<QueryExpander>, min_relevance: f32, date_broaden_days: i64) -> Self {
        Self {
            expander,
            judge: None,
            min_relevance,
            date_broaden_days,
        }
    }

    pub fn from_config(config: &AgentConfig, expander: Arc<QueryExpander>, llm: Arc<dyn LlmProvider>) -> Self {
        let replanner = Self::new(expander, config.min_relevance, config.date_broaden_days);
        if config.llm_sufficiency_check {
            replanner.with_judge(llm)
        } else {
            replanner
        }
    }

    pub fn with_judge(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.judge = Some(llm);
        self
    }

    /// Heuristic verdict, refined by the LLM judge when one is configured.
    /// A failing judge never overrides the heuristic.
    pub async fn evaluate(&self, question: &str, results: &[ToolResult]) -> Evaluation {
        let verdict = assess_results(results, self.min_relevance);
        if !verdict.sufficient {
            return verdict;
        }

        let Some(judge) = &self.judge else {
            return verdict;
        };

        let request = ChatRequest::new(
            TaskType::Evaluation,
            vec![ChatMessage::user(sufficiency_prompt(question, results))],
        )
        .with_max_tokens(64);

        match judge.complete(request).await {
            Ok(output) => {
                let (sufficient, reason) = parse_verdict(&output);
                if sufficient {
                    verdict
                } else {
                    Evaluation::insufficient(InsufficiencyPattern::Judged { reason })
                }
            }
            Err(e) => {
                warn!(error = %e, "sufficiency judgment failed, keeping heuristic verdict");
                verdict
            }
        }
    }

    /// Evaluate a round and, if insufficient, build the corrective plan.
    /// `None` means the results are accepted as they are.
    pub async fn evaluate_and_replan(&self, question: &str, results: &[ToolResult]) -> Option<Replan> {
        let evaluation = self.evaluate(question, results).await;
        let pattern = evaluation.pattern?;
        info!(pattern = %pattern, "results insufficient");
        self.correct(question, pattern, results).await
    }

    /// First applicable correction for an insufficient round
    pub async fn correct(
        &self,
        question: &str,
        pattern: InsufficiencyPattern,
        results: &[ToolResult],
    ) -> Option<Replan> {
        let candidates = [
            (CorrectionStrategy::BroadenDates, self.broaden_dates(results)),
            (CorrectionStrategy::DropEntityFilter, drop_entity_filters(results)),
            (CorrectionStrategy::SwitchToHybrid, switch_to_hybrid(results)),
            (CorrectionStrategy::FallbackTool, fallback_from_entity_tools(question, results)),
        ];

        let (strategy, calls) = match candidates.into_iter().find(|(_, calls)| !calls.is_empty()) {
            Some(found) => found,
            None => (CorrectionStrategy::ExpandTerms, self.expand_terms(question, results).await),
        };

        if calls.is_empty() {
            debug!("no correction applies, accepting results");
            return None;
        }

        info!(strategy = %strategy, calls = calls.len(), "replanning");
        Some(Replan {
            strategy,
            plan: Plan::new(format!("{}: {}", strategy, pattern), calls),
            pattern,
        })
    }

    fn broaden_dates(&self, results: &[ToolResult]) -> Vec<ToolCall> {
        results
            .iter()
            .filter(|r| !r.has_data())
            .filter(|r| r.tool_call.tool_name().is_some_and(|t| DATE_TOOLS.contains(&t)))
            .filter_map(|r| {
                let from = date_of(&r.tool_call, "date_from");
                let to = date_of(&r.tool_call, "date_to");
                if from.is_none() && to.is_none() {
                    return None;
                }
                let (from, to) = broaden_range(from, to, self.date_broaden_days);
                let mut call = r.tool_call.clone();
                set_date(&mut call, "date_from", from);
                set_date(&mut call, "date_to", to);
                Some(call)
            })
            .collect()
    }

    async fn expand_terms(&self, question: &str, results: &[ToolResult]) -> Vec<ToolCall> {
        let previous = results
            .iter()
            .map(|r| &r.tool_call)
            .find(|c| c.is(ToolName::SearchDocuments));

        let query = previous
            .and_then(|c| c.arg_str("query"))
            .unwrap_or(question)
            .to_string();
        let terms = split_terms(&query);
        let expanded = self.expander.expand_search_terms(&terms).await;

        let already_expanded = previous.is_some_and(|c| c.arguments.get("expand") == Some(&Value::Bool(true)));
        if previous.is_some() && (already_expanded || expanded.len() <= terms.len()) {
            return Vec::new();
        }

        let mut call = previous
            .cloned()
            .unwrap_or_else(|| ToolCall::new(ToolName::SearchDocuments.as_str(), json!({ "query": query })));
        call.arguments.insert("keywords".to_string(), json!(expanded));
        call.arguments.insert("expand".to_string(), Value::Bool(false));
        call.arguments.insert("strategy".to_string(), json!("hybrid"));
        vec![call]
    }
}

fn date_of(call: &ToolCall, key: &str) -> Option<NaiveDate> {
    call.arg_str(key).and_then(parse_date)
}

fn set_date(call: &mut ToolCall, key: &str, date: Option<NaiveDate>) {
    match date {
        Some(date) => {
            call.arguments.insert(key.to_string(), Value::String(format_date(date)));
        }
        None => {
            call.arguments.remove(key);
        }
    }
}

fn drop_entity_filters(results: &[ToolResult]) -> Vec<ToolCall> {
    results
        .iter()
        .filter(|r| !r.has_data())
        .filter_map(|r| {
            let key = match r.tool_call.tool_name()? {
                ToolName::SearchDocuments => "sender",
                ToolName::SearchDispatchOrders => "assignee",
                _ => return None,
            };
            r.tool_call.arg_str(key)?;
            let mut call = r.tool_call.clone();
            call.arguments.remove(key);
            Some(call)
        })
        .collect()
}

fn switch_to_hybrid(results: &[ToolResult]) -> Vec<ToolCall> {
    results
        .iter()
        .map(|r| &r.tool_call)
        .filter(|c| c.is(ToolName::SearchDocuments))
        .filter(|c| matches!(c.arg_str("strategy"), Some(s) if !s.eq_ignore_ascii_case("hybrid")))
        .map(|c| {
            let mut call = c.clone();
            call.arguments.insert("strategy".to_string(), json!("hybrid"));
            call
        })
        .collect()
}

fn fallback_from_entity_tools(question: &str, results: &[ToolResult]) -> Vec<ToolCall> {
    let entity_results: Vec<&ToolResult> = results
        .iter()
        .filter(|r| r.tool_call.tool_name().is_some_and(|t| t.is_entity_tool()))
        .collect();
    if entity_results.is_empty() || entity_results.iter().any(|r| r.has_data()) {
        return Vec::new();
    }

    let mut calls: Vec<ToolCall> = Vec::new();
    for result in entity_results {
        let query = result
            .tool_call
            .arg_str("name")
            .or_else(|| result.tool_call.arg_str("query"))
            .unwrap_or(question);
        if !calls.iter().any(|c| c.arg_str("query") == Some(query)) {
            calls.push(ToolCall::new(
                ToolName::SearchDocuments.as_str(),
                json!({ "query": query, "expand": true }),
            ));
        }
    }
    calls
}

/// Heuristic sufficiency check.
///
/// Insufficient when no call produced data, or when every produced document
/// is below `min_relevance` on its strongest signal and no entity detail or
/// statistics came back.
pub fn assess_results(results: &[ToolResult], min_relevance: f32) -> Evaluation {
    let productive: Vec<&ToolResult> = results.iter().filter(|r| r.has_data()).collect();

    if productive.is_empty() {
        let failed = results.iter().filter(|r| !r.success).count();
        return Evaluation::insufficient(InsufficiencyPattern::NoResults {
            failed,
            empty: results.len() - failed,
        });
    }

    let answers_directly = productive
        .iter()
        .any(|r| r.data.as_ref().is_some_and(ToolOutput::is_direct_answer));
    if answers_directly {
        return Evaluation::sufficient();
    }

    let best_score = productive
        .iter()
        .flat_map(|r| r.documents())
        .map(|d| d.relevance())
        .fold(0.0_f32, f32::max);

    if best_score < min_relevance {
        Evaluation::insufficient(InsufficiencyPattern::LowRelevance { best_score })
    } else {
        Evaluation::sufficient()
    }
}
