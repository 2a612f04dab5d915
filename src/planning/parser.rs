//! Tolerant plan parsing
//!
//! Model output is read as a plan through a fixed chain of strategies,
//! first success wins:
//! 1. the whole text is a JSON plan
//! 2. the body of a fenced code block is a JSON plan
//! 3. the first balanced `{...}` span is a JSON plan
//!
//! Nothing beyond these three shapes is attempted.

use regex::Regex;
use std::sync::OnceLock;

use crate::llm::first_balanced_object;
use crate::planning::types::{Plan, PlanParseError};

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*\n?(.*?)```").expect("valid fence pattern"))
}

/// Parse planner output through the fallback chain
pub fn parse_plan(raw: &str) -> Result<Plan, PlanParseError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(PlanParseError::Empty);
    }

    let chain: [fn(&str) -> Result<Plan, PlanParseError>; 3] = [parse_direct, parse_fenced, parse_balanced];
    let mut last_error = PlanParseError::NoJson;
    for attempt in chain {
        match attempt(text) {
            Ok(plan) => return Ok(plan),
            Err(e @ PlanParseError::InvalidShape(_)) => last_error = e,
            Err(_) => {}
        }
    }
    Err(last_error)
}

/// Strategy 1: the text itself is the plan object
pub fn parse_direct(text: &str) -> Result<Plan, PlanParseError> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return Err(PlanParseError::NoJson);
    }
    decode(trimmed)
}

/// Strategy 2: a fenced code block holds the plan object
pub fn parse_fenced(text: &str) -> Result<Plan, PlanParseError> {
    let body = fence_pattern()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|b| b.starts_with('{'))
        .ok_or(PlanParseError::NoJson)?;
    decode(body)
}

/// Strategy 3: the first balanced object anywhere in the text
pub fn parse_balanced(text: &str) -> Result<Plan, PlanParseError> {
    let span = first_balanced_object(text).ok_or(PlanParseError::NoJson)?;
    decode(span)
}

fn decode(json: &str) -> Result<Plan, PlanParseError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| PlanParseError::InvalidShape(e.to_string()))?;
    if !value.is_object() {
        return Err(PlanParseError::InvalidShape("top level is not an object".to_string()));
    }
    serde_json::from_value(value).map_err(|e| PlanParseError::InvalidShape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str =
        r#"{"reasoning": "查公文", "tool_calls": [{"name": "search_documents", "arguments": {"query": "道路"}}]}"#;

    #[test]
    fn test_direct_json() {
        let plan = parse_direct(PLAN).unwrap();
        assert_eq!(plan.reasoning, "查公文");
        assert_eq!(plan.tool_calls[0].name, "search_documents");
        assert_eq!(plan.tool_calls[0].arg_str("query"), Some("道路"));
    }

    #[test]
    fn test_direct_rejects_prose() {
        assert_eq!(parse_direct("好的，計畫如下"), Err(PlanParseError::NoJson));
    }

    #[test]
    fn test_fenced_block() {
        let raw = format!("計畫如下：\n```json\n{}\n```\n以上。", PLAN);
        assert!(parse_direct(&raw).is_err());
        let plan = parse_fenced(&raw).unwrap();
        assert_eq!(plan.tool_calls.len(), 1);
    }

    #[test]
    fn test_fenced_block_without_language_tag() {
        let raw = format!("```\n{}\n```", PLAN);
        assert_eq!(parse_fenced(&raw).unwrap().tool_calls.len(), 1);
    }

    #[test]
    fn test_balanced_span_in_prose() {
        let raw = format!("我會這樣做 {} 然後回答", PLAN);
        assert!(parse_fenced(&raw).is_err());
        let plan = parse_balanced(&raw).unwrap();
        assert_eq!(plan.tool_calls[0].name, "search_documents");
    }

    #[test]
    fn test_chain_picks_first_success() {
        assert!(parse_plan(PLAN).is_ok());
        assert!(parse_plan(&format!("```json\n{}\n```", PLAN)).is_ok());
        assert!(parse_plan(&format!("plan: {} done", PLAN)).is_ok());
    }

    #[test]
    fn test_chain_errors() {
        assert_eq!(parse_plan("   "), Err(PlanParseError::Empty));
        assert_eq!(parse_plan("沒有任何 JSON"), Err(PlanParseError::NoJson));
        assert!(matches!(
            parse_plan(r#"{"tool_calls": "search_documents"}"#),
            Err(PlanParseError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_empty_tool_calls_is_a_valid_plan() {
        let plan = parse_plan(r#"{"reasoning": "閒聊", "tool_calls": []}"#).unwrap();
        assert!(plan.is_empty());
    }
}
