//! Error types for docseeker
//!
//! One error enum for the whole retrieval core. Every variant maps to a
//! stable wire code and a user-safe message; raw provider text only ever
//! reaches the logs.

use thiserror::Error;

/// Main error type for the retrieval-and-synthesis core
#[derive(Error, Debug)]
pub enum AgentError {
    /// Turn state machine transition errors
    #[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// LLM completion provider errors
    #[error("LLM provider error: {0}")]
    LlmError(String),

    /// Embedding provider errors
    #[error("Embedding provider error: {0}")]
    EmbeddingError(String),

    /// Document store / knowledge graph errors
    #[error("Store error: {0}")]
    StoreError(String),

    /// Provider answered with a non-success HTTP status
    #[error("Provider returned HTTP {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    /// Streaming errors
    #[error("Streaming error: {0}")]
    StreamingError(String),

    /// JSON parsing errors
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    /// Tool name outside the registered catalogue
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments failed to deserialize into the typed request
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// Single tool call exceeded its timeout
    #[error("Tool {tool} timed out after {duration_ms}ms")]
    ToolTimeout { tool: String, duration_ms: u64 },

    /// Caller exceeded its request budget
    #[error("Rate limit exceeded for caller {caller}, retry in {retry_after_ms}ms")]
    RateLimited { caller: String, retry_after_ms: u64 },

    /// Whole-turn deadline exceeded
    #[error("Turn timed out after {duration_ms}ms")]
    TurnTimeout { duration_ms: u64 },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Operation timeout (provider requests)
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generic errors with context
    #[error("Agent error: {0}")]
    Generic(String),
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Stable machine-readable code carried by `Event::Error`
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::RateLimited { .. } => "rate_limited",
            AgentError::TurnTimeout { .. }
            | AgentError::Timeout { .. }
            | AgentError::ToolTimeout { .. } => "timeout",
            AgentError::LlmError(_)
            | AgentError::EmbeddingError(_)
            | AgentError::ProviderStatus { .. }
            | AgentError::StreamingError(_)
            | AgentError::HttpError(_) => "provider_error",
            AgentError::StoreError(_) => "store_error",
            AgentError::UnknownTool(_) | AgentError::InvalidArguments { .. } => "invalid_request",
            _ => "internal_error",
        }
    }

    /// Message safe to show to the end user. Never includes provider detail.
    pub fn user_message(&self) -> String {
        match self {
            AgentError::RateLimited { retry_after_ms, .. } => format!(
                "請求過於頻繁，請於 {} 秒後再試。",
                retry_after_ms.div_ceil(1000).max(1)
            ),
            AgentError::TurnTimeout { .. }
            | AgentError::Timeout { .. }
            | AgentError::ToolTimeout { .. } => "查詢逾時，請縮小查詢範圍後再試一次。".to_string(),
            AgentError::LlmError(_)
            | AgentError::EmbeddingError(_)
            | AgentError::ProviderStatus { .. }
            | AgentError::StreamingError(_)
            | AgentError::HttpError(_) => "AI 服務暫時無法使用，請稍後再試。".to_string(),
            _ => "處理您的問題時發生錯誤，請稍後再試。".to_string(),
        }
    }

    /// Whether a retry of the same provider request could succeed: transport
    /// failures, timeouts, 5xx and 429. Rejected requests and unreadable
    /// bodies fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Timeout { .. } | AgentError::StreamingError(_) => true,
            AgentError::HttpError(e) => !e.is_decode() && !e.is_builder() && e.status().is_none(),
            AgentError::ProviderStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Convert anyhow errors to AgentError
impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::ToolTimeout {
            tool: "search_documents".to_string(),
            duration_ms: 5000,
        };
        assert!(err.to_string().contains("search_documents"));
        assert!(err.to_string().contains("5000"));
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = AgentError::InvalidTransition {
            from: "Planning".to_string(),
            to: "Start".to_string(),
            reason: "Cannot go backwards".to_string(),
        };
        assert!(err.to_string().contains("Planning"));
        assert!(err.to_string().contains("Start"));
    }

    #[test]
    fn test_codes_are_distinct_for_rate_limit() {
        let limited = AgentError::RateLimited {
            caller: "u1".to_string(),
            retry_after_ms: 1500,
        };
        assert_eq!(limited.code(), "rate_limited");
        assert_eq!(AgentError::LlmError("boom".into()).code(), "provider_error");
        assert_eq!(AgentError::TurnTimeout { duration_ms: 10 }.code(), "timeout");
        assert_eq!(AgentError::Generic("x".into()).code(), "internal_error");
    }

    #[test]
    fn test_user_message_hides_provider_detail() {
        let err = AgentError::LlmError("connection refused at 10.0.0.3:11434".to_string());
        let msg = err.user_message();
        assert!(!msg.contains("10.0.0.3"));
        assert!(!msg.contains("refused"));
    }

    #[test]
    fn test_only_transport_failures_are_transient() {
        let unavailable = AgentError::ProviderStatus {
            status: 503,
            body: "loading model".to_string(),
        };
        let throttled = AgentError::ProviderStatus {
            status: 429,
            body: String::new(),
        };
        let not_found = AgentError::ProviderStatus {
            status: 404,
            body: "model not found".to_string(),
        };
        assert!(unavailable.is_transient());
        assert!(throttled.is_transient());
        assert!(AgentError::Timeout { duration_ms: 10 }.is_transient());
        assert!(!not_found.is_transient());
        assert!(!AgentError::LlmError("Failed to parse response".into()).is_transient());
        assert!(!AgentError::EmbeddingError("Failed to parse embedding".into()).is_transient());
        assert_eq!(not_found.code(), "provider_error");
        assert!(!not_found.user_message().contains("model"));
    }

    #[test]
    fn test_rate_limit_message_rounds_up_seconds() {
        let err = AgentError::RateLimited {
            caller: "u1".to_string(),
            retry_after_ms: 1500,
        };
        assert!(err.user_message().contains('2'));
    }
}
