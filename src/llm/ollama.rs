//! Ollama API client
//!
//! Chat completions (single-shot and NDJSON token streaming) over
//! `POST /api/chat`, and embeddings over `POST /api/embeddings`.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::embedding::EmbeddingProvider;
use crate::errors::{AgentError, Result};
use crate::llm::parser::JsonParser;
use crate::llm::retry::RetryManager;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TokenStream};

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default chat model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Ollama HTTP client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
    timeout: Duration,
    retry: RetryManager,
}

impl OllamaClient {
    /// Create new Ollama client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL)
    }

    /// Create Ollama client with custom configuration
    pub fn with_config(base_url: &str, model: &str) -> Result<Self> {
        Self::with_timeout(base_url, model, REQUEST_TIMEOUT)
    }

    /// Create Ollama client with an explicit request timeout
    pub fn with_timeout(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AgentError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout,
            retry: RetryManager::new(),
        })
    }

    /// Build a client from the `[llm]` config section
    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        let client = Self::with_timeout(
            &config.ollama_url(),
            &config.llm.chat_model,
            Duration::from_secs(config.llm.request_timeout_secs),
        )?;
        Ok(client
            .with_embedding_model(&config.llm.embedding_model)
            .with_retry(RetryManager::with_config(config.llm.max_retries + 1, 250)))
    }

    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = model.to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryManager) -> Self {
        self.retry = retry;
        self
    }

    /// Timeouts carry the configured limit; everything else stays a transport error
    fn send_error(&self, e: reqwest::Error) -> AgentError {
        if e.is_timeout() {
            AgentError::Timeout {
                duration_ms: self.timeout.as_millis() as u64,
            }
        } else {
            AgentError::HttpError(e)
        }
    }

    async fn status_error(response: reqwest::Response) -> AgentError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        AgentError::ProviderStatus { status, body }
    }

    fn chat_body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> OllamaChatRequest<'a> {
        OllamaChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    async fn post_chat(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.chat_body(request, stream))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        Ok(response)
    }

    async fn complete_once(&self, request: &ChatRequest) -> Result<String> {
        let response = self.post_chat(request, false).await?;
        let body: OllamaChatChunk = response
            .json()
            .await
            .map_err(|e| AgentError::LlmError(format!("Failed to parse response: {}", e)))?;
        Ok(body.message.map(|m| m.content).unwrap_or_default())
    }

    async fn embed_once(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbeddingRequest {
                model: &self.embedding_model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AgentError::EmbeddingError(format!("Failed to parse embedding: {}", e)))?;

        Ok(Some(body.embedding).filter(|v| !v.is_empty()))
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Get current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get embedding model name
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Per-request timeout applied by the HTTP client
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LlmProvider for OllamaClient {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.retry
            .execute_with_retry(|| self.complete_once(&request))
            .await
    }

    async fn stream(&self, request: ChatRequest) -> Result<TokenStream> {
        let response = self.post_chat(&request, true).await?;
        let bytes = Box::pin(response.bytes_stream());

        let tokens = stream::unfold(
            (bytes, JsonParser::new(), false),
            |(mut bytes, mut parser, mut finished)| async move {
                loop {
                    if finished {
                        return None;
                    }

                    match parser.next_object() {
                        Ok(Some(object)) => match serde_json::from_str::<OllamaChatChunk>(&object) {
                            Ok(chunk) => {
                                finished = chunk.done;
                                let content = chunk.message.map(|m| m.content).unwrap_or_default();
                                if !content.is_empty() {
                                    return Some((Ok(content), (bytes, parser, finished)));
                                }
                                continue;
                            }
                            Err(e) => {
                                return Some((Err(AgentError::from(e)), (bytes, parser, true)));
                            }
                        },
                        Ok(None) => {}
                        Err(e) => return Some((Err(e), (bytes, parser, true))),
                    }

                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            if let Err(e) = parser.feed(&chunk) {
                                return Some((Err(e), (bytes, parser, true)));
                            }
                        }
                        Some(Err(e)) => {
                            let err = AgentError::StreamingError(e.to_string());
                            return Some((Err(err), (bytes, parser, true)));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(Box::pin(tokens))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        self.retry.execute_with_retry(|| self.embed_once(text)).await
    }
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// One chat response object (whole body, or one NDJSON line when streaming)
#[derive(Debug, Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}
