//! Configuration management for docseeker
//!
//! TOML-based configuration with defaults and validation.
//! Location: ~/.docseeker/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AgentError, Result};

/// Complete configuration for docseeker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub expansion: ExpansionConfig,
}

/// LLM / embedding provider connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub host: String,
    pub port: u16,
    pub chat_model: String,
    pub embedding_model: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

/// Turn pipeline behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Most recent conversation turns forwarded to the LLM
    pub history_turns: usize,
    /// Per tool-call timeout
    pub tool_timeout_ms: u64,
    /// Ceiling for planning + execution + evaluation of one turn
    pub turn_timeout_ms: u64,
    pub max_concurrent_tools: usize,
    /// Rerank score under which a document does not count as relevant
    pub min_relevance: f32,
    /// Ask the LLM to judge sufficiency instead of the score heuristic
    pub llm_sufficiency_check: bool,
    /// Days added on both sides of a date filter when broadening
    pub date_broaden_days: i64,
    pub default_result_limit: usize,
}

/// Hybrid rerank weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub w_vector: f32,
    pub w_keyword: f32,
    pub w_llm: f32,
    /// Opt into the batch LLM judgment in `search_documents`
    pub llm_rerank: bool,
    pub max_llm_candidates: usize,
}

/// Embedding cache limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
    /// Concurrent in-flight embedding provider calls
    pub max_in_flight: usize,
    pub sweep_interval_secs: u64,
}

/// Per-caller token bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub burst: u32,
    pub refill_per_sec: f64,
}

/// Synonym / alias expansion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub max_aliases_per_term: usize,
    pub synonyms_path: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            chat_model: "qwen2.5:7b-instruct".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            request_timeout_secs: 60,
            max_retries: 2,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            history_turns: 10,
            tool_timeout_ms: 5_000,
            turn_timeout_ms: 60_000,
            max_concurrent_tools: 4,
            min_relevance: 0.35,
            llm_sufficiency_check: false,
            date_broaden_days: 365,
            default_result_limit: 10,
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            w_vector: 0.5,
            w_keyword: 0.3,
            w_llm: 0.2,
            llm_rerank: false,
            max_llm_candidates: 15,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl_secs: 3600,
            max_in_flight: 4,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 10,
            refill_per_sec: 0.5,
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_aliases_per_term: 10,
            synonyms_path: None,
        }
    }
}

impl AgentConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AgentError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| AgentError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from ~/.docseeker/config.toml, writing the defaults there on first use
    pub fn load_default() -> Result<Self> {
        let Some(config_path) = Self::default_path() else {
            return Ok(Config::default());
        };

        if config_path.exists() {
            return Self::load_from_file(&config_path);
        }

        let config = Config::default();
        if let Err(e) = config.save(&config_path) {
            tracing::warn!(path = %config_path.display(), error = %e, "could not write default config");
        }
        Ok(config)
    }

    /// Standard configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".docseeker").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.agent.tool_timeout_ms == 0 || self.agent.turn_timeout_ms == 0 {
            return Err(AgentError::ConfigError(
                "tool_timeout_ms and turn_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.agent.max_concurrent_tools == 0 {
            return Err(AgentError::ConfigError(
                "max_concurrent_tools must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.agent.min_relevance) {
            return Err(AgentError::ConfigError(
                "min_relevance must be between 0.0 and 1.0".to_string(),
            ));
        }

        let weights = [self.rerank.w_vector, self.rerank.w_keyword, self.rerank.w_llm];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(AgentError::ConfigError(
                "rerank weights must not be negative".to_string(),
            ));
        }

        if self.cache.capacity == 0 || self.cache.max_in_flight == 0 {
            return Err(AgentError::ConfigError(
                "cache capacity and max_in_flight must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.burst == 0 || self.rate_limit.refill_per_sec < 0.0 {
            return Err(AgentError::ConfigError(
                "rate_limit burst must be positive and refill_per_sec non-negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AgentError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::ConfigError(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| AgentError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Ollama base URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.llm.host, self.llm.port)
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Synonym file, if configured
    pub fn synonyms_path(&self) -> Option<PathBuf> {
        self.expansion
            .synonyms_path
            .as_deref()
            .map(Self::expand_path)
    }
}
