//! Prompt templates for planning and result evaluation

use chrono::NaiveDate;

use crate::planning::hints::{format_date, TurnHints};
use crate::tools::registry::ToolRegistry;
use crate::tools::types::ToolResult;

/// System prompt for the planning call: catalogue plus output contract
pub fn planner_system_prompt(registry: &ToolRegistry, today: NaiveDate) -> String {
    format!(
        r#"你是公文檢索助理的規劃器。今天是 {today}。
根據使用者問題與對話紀錄，決定要呼叫哪些工具。

可用工具：
{catalogue}

規則：
1. 只能使用上列工具名稱。
2. 日期一律使用 YYYY-MM-DD；民國年請加 1911 轉為西元年。
3. 問題需要查資料時至少呼叫一個工具；多個工具可同時列出。
4. 只輸出一個 JSON 物件，不要任何其他文字：
{{"reasoning": "簡短說明", "tool_calls": [{{"name": "工具名稱", "arguments": {{...}}}}]}}"#,
        today = format_date(today),
        catalogue = registry.render_catalogue(),
    )
}

/// User message for the planning call, carrying hints the model must respect
pub fn planner_user_prompt(question: &str, hints: &TurnHints) -> String {
    let mut prompt = format!("問題：{}", question);
    if hints.has_date_range() {
        prompt.push_str(&format!(
            "\n已知日期範圍：{} ~ {}",
            hints.date_from_arg().unwrap_or_default(),
            hints.date_to_arg().unwrap_or_default()
        ));
    }
    if let Some(entity) = &hints.entity {
        prompt.push_str(&format!("\n已知相關單位或人物：{}", entity));
    }
    prompt
}

/// Prompt asking the model whether a round of results answers the question
pub fn sufficiency_prompt(question: &str, results: &[ToolResult]) -> String {
    let mut lines = Vec::with_capacity(results.len());
    for (i, result) in results.iter().enumerate() {
        let outcome = match (&result.data, &result.error) {
            (Some(data), _) if result.success => data.summary(),
            (_, Some(error)) => format!("失敗：{}", error),
            _ => "無資料".to_string(),
        };
        lines.push(format!("{}. {} → {}", i + 1, result.tool_call.name, outcome));
        for doc in result.documents().iter().take(3) {
            lines.push(format!("   - {}", doc.label()));
        }
    }

    format!(
        "問題：{}\n\n工具結果：\n{}\n\n這些結果足以回答問題嗎？只回答 YES 或 NO，後面可附一句理由。",
        question,
        lines.join("\n")
    )
}

/// Read a YES/NO verdict; anything unreadable counts as sufficient
pub fn parse_verdict(output: &str) -> (bool, String) {
    let trimmed = output.trim();
    let upper = trimmed.to_uppercase();
    let insufficient = upper.starts_with("NO") || trimmed.starts_with('否') || trimmed.starts_with("不足");
    let reason = trimmed
        .trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '否')
        .trim_start_matches([',', '，', ':', '：', '.', '。', ' '])
        .to_string();
    (!insufficient, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::ToolCall;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_system_prompt_lists_catalogue() {
        let prompt = planner_system_prompt(&ToolRegistry::new(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert!(prompt.contains("2024-05-01"));
        assert!(prompt.contains("search_documents"));
        assert!(prompt.contains("get_statistics"));
        assert!(prompt.contains(r#""tool_calls""#));
    }

    #[test]
    fn test_user_prompt_carries_hints() {
        let hints = TurnHints {
            date_from: NaiveDate::from_ymd_opt(2024, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2024, 12, 31),
            entity: Some("工務局".to_string()),
        };
        let prompt = planner_user_prompt("道路", &hints);
        assert!(prompt.contains("2024-01-01 ~ 2024-12-31"));
        assert!(prompt.contains("工務局"));
        assert_eq!(planner_user_prompt("道路", &TurnHints::default()), "問題：道路");
    }

    #[test]
    fn test_sufficiency_prompt_marks_failures() {
        let results = vec![ToolResult::failure(
            ToolCall::new("search_documents", json!({"query": "x"})),
            "timed out",
            Duration::from_millis(5),
        )];
        let prompt = sufficiency_prompt("x?", &results);
        assert!(prompt.contains("1. search_documents → 失敗：timed out"));
    }

    #[test]
    fn test_parse_verdict() {
        assert!(parse_verdict("YES").0);
        assert!(parse_verdict("yes, 有足夠資料").0);
        let (ok, reason) = parse_verdict("NO，缺少日期");
        assert!(!ok);
        assert_eq!(reason, "缺少日期");
        assert!(!parse_verdict("否").0);
        assert!(parse_verdict("我不確定").0);
    }
}
