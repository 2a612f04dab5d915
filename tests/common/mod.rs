//! Shared fixtures for integration tests: a scripted LLM, a counting
//! embedder, an instrumented document store and a small corpus.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use docseeker::agent::Orchestrator;
use docseeker::config::Config;
use docseeker::embedding::{EmbeddingCache, EmbeddingProvider};
use docseeker::errors::{AgentError, Result};
use docseeker::expansion::SynonymIndex;
use docseeker::llm::{ChatRequest, LlmProvider, TaskType};
use docseeker::store::memory::StoredDocument;
use docseeker::store::{
    AliasRecord, DispatchFilter, DocumentFilter, DocumentRecord, DocumentStore, Entity,
    InMemoryDocumentStore, InMemoryKnowledgeGraph, Statistics, StatisticsQuery, FIELD_DATE,
    FIELD_DOC_NUMBER, FIELD_SENDER, FIELD_SUBJECT,
};
use docseeker::types::{Event, Stage};

pub const ANSWER: &str = "共有 2 筆相關公文 [1]。";

/// LLM whose planning replies are scripted in order; every other task
/// gets a fixed reply. Records the task type of each request.
pub struct ScriptedLlm {
    plans: Mutex<VecDeque<String>>,
    tasks: Mutex<Vec<TaskType>>,
    planning_delay: Duration,
    fail: bool,
}

impl ScriptedLlm {
    pub fn new(plans: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.iter().map(|p| p.to_string()).collect()),
            tasks: Mutex::new(Vec::new()),
            planning_delay: Duration::ZERO,
            fail: false,
        })
    }

    pub fn slow(plans: &[&str], planning_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.iter().map(|p| p.to_string()).collect()),
            tasks: Mutex::new(Vec::new()),
            planning_delay,
            fail: false,
        })
    }

    /// Every call fails with a raw provider error
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(VecDeque::new()),
            tasks: Mutex::new(Vec::new()),
            planning_delay: Duration::ZERO,
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn calls_for(&self, task: TaskType) -> usize {
        self.tasks.lock().unwrap().iter().filter(|t| **t == task).count()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.tasks.lock().unwrap().push(request.task_type);
        if self.fail {
            return Err(AgentError::LlmError(
                "connection refused (os error 111) at 10.0.0.5:11434".to_string(),
            ));
        }

        match request.task_type {
            TaskType::Planning => {
                if !self.planning_delay.is_zero() {
                    tokio::time::sleep(self.planning_delay).await;
                }
                let plan = self.plans.lock().unwrap().pop_front();
                Ok(plan.unwrap_or_else(|| r#"{"reasoning": "", "tool_calls": []}"#.to_string()))
            }
            TaskType::Evaluation => Ok("YES".to_string()),
            TaskType::Rerank => Ok("1".to_string()),
            TaskType::Synthesis => Ok(format!("<think>整理結果</think>{}", ANSWER)),
            TaskType::Chitchat => Ok("哈，有需要查公文再跟我說！".to_string()),
        }
    }
}

/// Every text embeds to the same unit vector, so every indexed document
/// is a perfect vector match.
#[derive(Default)]
pub struct CountingEmbedder {
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    delay: Duration,
}

impl CountingEmbedder {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, text: &str) -> usize {
        self.texts.lock().unwrap().iter().filter(|t| *t == text).count()
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Some(vec![1.0, 0.0]))
    }
}

/// Delegating store that counts every query and can stall `statistics`
pub struct InstrumentedStore {
    inner: InMemoryDocumentStore,
    calls: AtomicUsize,
    statistics_delay: Duration,
}

impl InstrumentedStore {
    pub fn new(inner: InMemoryDocumentStore) -> Arc<Self> {
        Self::with_statistics_delay(inner, Duration::ZERO)
    }

    pub fn with_statistics_delay(inner: InMemoryDocumentStore, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicUsize::new(0),
            statistics_delay: delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for InstrumentedStore {
    async fn keyword_search(&self, filter: &DocumentFilter, limit: usize) -> Result<Vec<DocumentRecord>> {
        self.hit();
        self.inner.keyword_search(filter, limit).await
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        filter: &DocumentFilter,
        limit: usize,
    ) -> Result<Vec<(DocumentRecord, f32)>> {
        self.hit();
        self.inner.vector_search(embedding, filter, limit).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        self.hit();
        self.inner.get_document(id).await
    }

    async fn search_dispatch_orders(&self, filter: &DispatchFilter, limit: usize) -> Result<Vec<DocumentRecord>> {
        self.hit();
        self.inner.search_dispatch_orders(filter, limit).await
    }

    async fn statistics(&self, query: &StatisticsQuery) -> Result<Statistics> {
        self.hit();
        if !self.statistics_delay.is_zero() {
            tokio::time::sleep(self.statistics_delay).await;
        }
        self.inner.statistics(query).await
    }
}

fn document(id: &str, number: &str, subject: &str, sender: &str, date: &str) -> StoredDocument {
    StoredDocument {
        record: DocumentRecord::new(id)
            .with_field(FIELD_DOC_NUMBER, number)
            .with_field(FIELD_SUBJECT, subject)
            .with_field(FIELD_SENDER, sender)
            .with_field(FIELD_DATE, date),
        embedding: Some(vec![1.0, 0.0]),
    }
}

pub fn documents() -> Vec<StoredDocument> {
    vec![
        document("D-001", "府工字第1130001號", "道路養護工程進度報告", "臺北市政府工務局", "2024-03-15"),
        document("D-002", "府環字第1120456號", "垃圾清運路線調整", "臺北市政府環境保護局", "2023-07-01"),
        document("D-003", "府工字第1130345號", "橋梁安全檢測結果", "臺北市政府工務局", "2024-08-20"),
    ]
}

pub fn synonym_groups() -> Vec<Vec<String>> {
    vec![
        vec!["臺北市政府工務局".to_string(), "工務局".to_string(), "北市工務局".to_string()],
        vec!["派工單".to_string(), "工單".to_string()],
    ]
}

pub fn knowledge_graph() -> InMemoryKnowledgeGraph {
    InMemoryKnowledgeGraph::new(
        vec![Entity {
            id: "E-1".to_string(),
            canonical_name: "臺北市政府工務局".to_string(),
            entity_type: "機關".to_string(),
        }],
        vec![
            AliasRecord {
                alias: "工務局".to_string(),
                entity_id: "E-1".to_string(),
            },
            AliasRecord {
                alias: "北市工務局".to_string(),
                entity_id: "E-1".to_string(),
            },
        ],
        Vec::new(),
    )
}

/// Configuration with fast timeouts for tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.agent.tool_timeout_ms = 200;
    config.agent.turn_timeout_ms = 5_000;
    config
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<InstrumentedStore>,
    pub embedder: Arc<CountingEmbedder>,
    pub cache: Arc<EmbeddingCache>,
}

pub fn harness(config: Config, llm: Arc<ScriptedLlm>, store: Arc<InstrumentedStore>) -> Harness {
    let embedder = Arc::new(CountingEmbedder::default());
    let cache = Arc::new(EmbeddingCache::new(embedder.clone(), config.cache.clone()));
    let orchestrator = Orchestrator::from_stores(
        config,
        llm,
        cache.clone(),
        store.clone(),
        Arc::new(knowledge_graph()),
        Arc::new(SynonymIndex::new(synonym_groups())),
    );
    Harness {
        orchestrator,
        store,
        embedder,
        cache,
    }
}

pub fn default_store() -> Arc<InstrumentedStore> {
    InstrumentedStore::new(InMemoryDocumentStore::new(documents(), Vec::new()))
}

pub fn terminal_events(events: &[Event]) -> Vec<&Event> {
    events.iter().filter(|e| e.is_terminal()).collect()
}

/// Asserts exactly one terminal event, last in the stream, and returns it
pub fn single_terminal(events: &[Event]) -> &Event {
    let terminals = terminal_events(events);
    assert_eq!(terminals.len(), 1, "expected one terminal event, got {:?}", events);
    let last = events.last().expect("events");
    assert!(last.is_terminal(), "terminal event must be last: {:?}", events);
    last
}

pub fn stage_count(events: &[Event], stage: Stage) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::Status { stage: s, .. } if *s == stage))
        .count()
}

pub fn stage_details(events: &[Event], stage: Stage) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Status { stage: s, detail } if *s == stage => detail.clone(),
            _ => None,
        })
        .collect()
}

pub fn answer_text(events: &[Event]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Token { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}
