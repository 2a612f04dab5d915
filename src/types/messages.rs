//! Message types crossing the turn boundary
//!
//! Conversation history comes in, a stream of `Event`s goes out.

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One prior message of the conversation, supplied read-only by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Keep only the most recent `max_turns` entries of the history
pub fn recent_history(history: &[ConversationTurn], max_turns: usize) -> &[ConversationTurn] {
    let start = history.len().saturating_sub(max_turns);
    &history[start..]
}

/// Citation attached to the final answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: String,
    pub label: String,
}

/// Pipeline stage reported through status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classifying,
    Chitchat,
    Planning,
    ToolExecution,
    Evaluation,
    Replanning,
    Synthesis,
}

impl Stage {
    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Classifying => "Classifying",
            Stage::Chitchat => "Replying",
            Stage::Planning => "Planning",
            Stage::ToolExecution => "Searching",
            Stage::Evaluation => "Evaluating results",
            Stage::Replanning => "Refining search",
            Stage::Synthesis => "Writing answer",
        }
    }
}

/// Streamed turn output. Exactly one `Done` or `Error` ends every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Status {
        stage: Stage,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Token {
        text: String,
    },
    Done {
        citations: Vec<SourceRef>,
        latency_ms: u64,
        tool_calls: usize,
    },
    Error {
        message: String,
        code: String,
    },
}

impl Event {
    pub fn status(stage: Stage) -> Self {
        Event::Status {
            stage,
            detail: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Done { .. } | Event::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_history_truncates_from_front() {
        let history: Vec<ConversationTurn> = (0..5)
            .map(|i| ConversationTurn::user(format!("q{}", i)))
            .collect();

        let recent = recent_history(&history, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "q3");
        assert_eq!(recent[1].content, "q4");

        assert_eq!(recent_history(&history, 10).len(), 5);
        assert!(recent_history(&history, 0).is_empty());
    }

    #[test]
    fn test_event_wire_format() {
        let event = Event::Error {
            message: "slow down".to_string(),
            code: "rate_limited".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "rate_limited");

        let status = serde_json::to_value(Event::status(Stage::ToolExecution)).unwrap();
        assert_eq!(status["type"], "status");
        assert_eq!(status["stage"], "tool_execution");
        assert!(status.get("detail").is_none());
    }

    #[test]
    fn test_terminal_events() {
        assert!(Event::Done {
            citations: vec![],
            latency_ms: 1,
            tool_calls: 0
        }
        .is_terminal());
        assert!(!Event::Token { text: "a".into() }.is_terminal());
    }
}
