//! LLM completion provider interface
//!
//! The core only talks to the model through [`LlmProvider`]. A chat request
//! carries the messages plus sampling settings and a task tag so providers
//! can route planning, reranking and synthesis to different models.

pub mod ollama;
pub mod parser;
pub mod retry;

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::errors::Result;
use crate::types::{ConversationTurn, Role};

// Re-export commonly used types
pub use ollama::{OllamaClient, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
pub use parser::{first_balanced_object, JsonParser, MAX_BUFFER_SIZE};
pub use retry::RetryManager;

/// Boxed stream of text deltas
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// What a completion is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Planning,
    Evaluation,
    Rerank,
    Synthesis,
    Chitchat,
}

/// Chat message role as sent to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        match turn.role {
            Role::User => ChatMessage::user(turn.content.clone()),
            Role::Assistant => ChatMessage::assistant(turn.content.clone()),
        }
    }
}

/// Chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub task_type: TaskType,
}

impl ChatRequest {
    pub fn new(task_type: TaskType, messages: Vec<ChatMessage>) -> Self {
        let (temperature, max_tokens) = match task_type {
            TaskType::Planning | TaskType::Evaluation | TaskType::Rerank => (0.1, 512),
            TaskType::Synthesis => (0.3, 2048),
            TaskType::Chitchat => (0.7, 256),
        };
        Self {
            messages,
            temperature,
            max_tokens,
            task_type,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Concatenated text of the last user message
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Chat-style completion provider
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Single-shot completion
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    /// Streamed completion. Defaults to one chunk holding the full completion.
    async fn stream(&self, request: ChatRequest) -> Result<TokenStream> {
        let text = self.complete(request).await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        async fn complete(&self, request: ChatRequest) -> Result<String> {
            Ok(request.last_user_content().unwrap_or_default().to_string())
        }
    }

    #[test]
    fn test_task_defaults() {
        let planning = ChatRequest::new(TaskType::Planning, vec![]);
        assert!(planning.temperature < 0.2);

        let synthesis = ChatRequest::new(TaskType::Synthesis, vec![]);
        assert!(synthesis.max_tokens > planning.max_tokens);
    }

    #[test]
    fn test_history_conversion() {
        let msg = ChatMessage::from(&ConversationTurn::assistant("hi"));
        assert_eq!(msg.role, ChatRole::Assistant);
        assert_eq!(msg.content, "hi");
    }

    #[tokio::test]
    async fn test_default_stream_yields_completion() {
        let request = ChatRequest::new(
            TaskType::Chitchat,
            vec![ChatMessage::system("s"), ChatMessage::user("hello")],
        );
        let chunks: Vec<String> = Echo
            .stream(request)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["hello".to_string()]);
    }
}
