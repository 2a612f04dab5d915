//! LLM planner
//!
//! Turns a question plus recent history into a `Plan`:
//! 1. ask the model for `{reasoning, tool_calls}` JSON
//! 2. parse tolerantly; unreadable output becomes the fallback plan
//! 3. merge turn hints into the calls (additive only)
//! 4. an empty plan for a retrieval question gets a forced search call

use chrono::{Local, NaiveDate};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TaskType};
use crate::planning::hints::TurnHints;
use crate::planning::parser::parse_plan;
use crate::planning::prompts::{planner_system_prompt, planner_user_prompt};
use crate::planning::types::Plan;
use crate::tools::registry::ToolRegistry;
use crate::tools::types::{ToolCall, ToolName};
use crate::types::{recent_history, ConversationTurn};

/// Tools whose arguments accept `date_from` / `date_to`
const DATE_TOOLS: [ToolName; 3] = [
    ToolName::SearchDocuments,
    ToolName::SearchDispatchOrders,
    ToolName::GetStatistics,
];

/// Tools that already cover an entity intent
const ENTITY_TOOLS: [ToolName; 2] = [ToolName::SearchEntities, ToolName::GetEntityDetail];

pub struct Planner {
    llm: Arc<dyn LlmProvider>,
    registry: ToolRegistry,
    history_turns: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmProvider>, history_turns: usize) -> Self {
        Self {
            llm,
            registry: ToolRegistry::new(),
            history_turns,
        }
    }

    /// Ask the model for a plan. Provider errors propagate; unreadable
    /// output falls back to a generic search plan.
    pub async fn plan(&self, question: &str, history: &[ConversationTurn], hints: &TurnHints) -> Result<Plan> {
        self.plan_on(question, history, hints, Local::now().date_naive()).await
    }

    async fn plan_on(
        &self,
        question: &str,
        history: &[ConversationTurn],
        hints: &TurnHints,
        today: NaiveDate,
    ) -> Result<Plan> {
        let mut messages = vec![ChatMessage::system(planner_system_prompt(&self.registry, today))];
        messages.extend(recent_history(history, self.history_turns).iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(planner_user_prompt(question, hints)));

        let raw = self.llm.complete(ChatRequest::new(TaskType::Planning, messages)).await?;

        let plan = match parse_plan(&raw) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "planner output unreadable, using fallback plan");
                return Ok(build_fallback_plan(question));
            }
        };

        debug!(tools = ?plan.tool_names(), reasoning = %plan.reasoning, "plan parsed");
        Ok(plan)
    }

    /// Merge hints, then force a search when nothing is left to run.
    /// Only called for turns that were not classified as chit-chat.
    pub fn finalize(&self, plan: Plan, question: &str, hints: &TurnHints) -> Plan {
        let mut plan = merge_hints_into_plan(plan, hints, question);
        if plan.is_empty() {
            info!("empty plan for a retrieval question, forcing a search");
            plan.tool_calls = build_forced_calls(question, hints);
            if plan.reasoning.is_empty() {
                plan.reasoning = "forced search".to_string();
            }
        }
        plan
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

/// Generic document search over the raw question
pub fn build_fallback_plan(question: &str) -> Plan {
    Plan::new(
        "fallback: planner output unreadable",
        vec![ToolCall::new(ToolName::SearchDocuments.as_str(), json!({ "query": question }))],
    )
}

/// At least one generic search call, carrying any date hint
pub fn build_forced_calls(question: &str, hints: &TurnHints) -> Vec<ToolCall> {
    let mut call = ToolCall::new(ToolName::SearchDocuments.as_str(), json!({ "query": question }));
    apply_date_hints(&mut call, hints);
    vec![call]
}

/// Insert a hint argument unless the model already chose a value
fn insert_missing(call: &mut ToolCall, key: &str, value: Option<String>) {
    if let Some(value) = value {
        if !call.has_arg(key) {
            call.arguments.insert(key.to_string(), Value::String(value));
        }
    }
}

fn apply_date_hints(call: &mut ToolCall, hints: &TurnHints) {
    insert_missing(call, "date_from", hints.date_from_arg());
    insert_missing(call, "date_to", hints.date_to_arg());
}

/// Merge hints additively. Existing arguments are never overwritten, and a
/// hint only adds a call when no call of the plan covers the same intent.
pub fn merge_hints_into_plan(mut plan: Plan, hints: &TurnHints, question: &str) -> Plan {
    if hints.is_empty() {
        return plan;
    }

    for call in plan.tool_calls.iter_mut() {
        let Some(tool) = call.tool_name() else { continue };
        if DATE_TOOLS.contains(&tool) {
            apply_date_hints(call, hints);
        }
        if ENTITY_TOOLS.contains(&tool) {
            insert_missing(call, "name", hints.entity.clone());
        }
    }

    if hints.has_date_range() && !plan.addresses(&DATE_TOOLS) {
        let mut call = ToolCall::new(ToolName::SearchDocuments.as_str(), json!({ "query": question }));
        apply_date_hints(&mut call, hints);
        plan.tool_calls.push(call);
    }

    if let Some(entity) = &hints.entity {
        if !plan.addresses(&ENTITY_TOOLS) {
            plan.tool_calls
                .push(ToolCall::new(ToolName::SearchEntities.as_str(), json!({ "name": entity })));
        }
    }

    plan
}
