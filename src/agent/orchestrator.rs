//! Turn orchestrator
//!
//! Drives one user turn through the `TurnStateMachine`:
//! chit-chat check, rate limit, planning, tool execution, evaluation, at
//! most one replan, then streamed synthesis. Events reach the caller through
//! an unbounded channel; `TurnSink` guarantees exactly one terminal event per
//! turn, even when the turn task panics or is dropped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::chitchat::{chitchat_system_prompt, classify};
use crate::agent::rate_limit::RateLimiter;
use crate::agent::state::{TurnEvent, TurnStateMachine};
use crate::config::Config;
use crate::embedding::cache::EmbeddingCache;
use crate::errors::{AgentError, Result};
use crate::expansion::{QueryExpander, SynonymIndex};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TaskType};
use crate::planning::{detect_hints, Planner, Replanner, TurnHints};
use crate::rag::retrieval::RetrievalEngine;
use crate::rag::reranking::Reranker;
use crate::store::{DocumentStore, KnowledgeGraph};
use crate::synthesis::{stream_sanitized, Synthesizer};
use crate::tools::{ToolContext, ToolExecutor, ToolResult};
use crate::types::{recent_history, ConversationTurn, Event, SourceRef, Stage};

/// Inbound turn
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub question: String,
    pub history: Vec<ConversationTurn>,
    pub caller_id: String,
    /// Caller heuristics: `date_from`, `date_to`, `entity`
    pub hints: Option<Value>,
}

impl TurnRequest {
    pub fn new(question: impl Into<String>, caller_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            caller_id: caller_id.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_hints(mut self, hints: Value) -> Self {
        self.hints = Some(hints);
        self
    }
}

/// Citations of a turn: successful results only, deduplicated by document
/// id in first-seen order
pub fn collect_sources(results: &[ToolResult]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.data.as_ref())
        .flat_map(|data| data.source_refs())
        .filter(|s| seen.insert(s.document_id.clone()))
        .collect()
}

/// Sending half of a turn's event stream.
///
/// Dropping the sink before `finish` sends an `internal_error` event, so a
/// consumer always sees exactly one `Done` or `Error`.
struct TurnSink {
    tx: UnboundedSender<Event>,
    finished: bool,
}

impl TurnSink {
    fn new(tx: UnboundedSender<Event>) -> Self {
        Self { tx, finished: false }
    }

    /// A closed receiver only means nobody is listening any more
    fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    fn status(&self, stage: Stage, detail: Option<String>) {
        self.send(Event::Status { stage, detail });
    }

    fn token(&self, text: &str) {
        self.send(Event::Token {
            text: text.to_string(),
        });
    }

    fn finish(mut self, event: Event) {
        debug_assert!(event.is_terminal());
        self.send(event);
        self.finished = true;
    }

    fn fail(self, err: &AgentError) {
        self.finish(Event::Error {
            message: err.user_message(),
            code: err.code().to_string(),
        });
    }
}

impl Drop for TurnSink {
    fn drop(&mut self) {
        if !self.finished {
            error!("turn ended without a terminal event");
            self.send(Event::Error {
                message: AgentError::Generic(String::new()).user_message(),
                code: "internal_error".to_string(),
            });
        }
    }
}

/// What a completed turn reports in its `Done` event
struct TurnOutcome {
    citations: Vec<SourceRef>,
    tool_calls: usize,
}

struct Components {
    config: Config,
    llm: Arc<dyn LlmProvider>,
    planner: Planner,
    replanner: Replanner,
    executor: ToolExecutor,
    synthesizer: Synthesizer,
    limiter: RateLimiter,
}

/// Entry point of the retrieval core. Cheap to clone; clones share the rate
/// limiter and every store.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Components>,
}

impl Orchestrator {
    pub fn new(config: Config, llm: Arc<dyn LlmProvider>, context: Arc<ToolContext>) -> Self {
        let agent = &config.agent;
        let replanner = Replanner::from_config(agent, Arc::clone(&context.expander), Arc::clone(&llm));
        let executor = ToolExecutor::with_concurrency(context, agent.tool_timeout(), agent.max_concurrent_tools);
        let inner = Components {
            planner: Planner::new(Arc::clone(&llm), agent.history_turns),
            synthesizer: Synthesizer::new(Arc::clone(&llm), agent.history_turns),
            limiter: RateLimiter::new(&config.rate_limit),
            replanner,
            executor,
            llm,
            config,
        };
        Self { inner: Arc::new(inner) }
    }

    /// Wire the whole core from its outbound collaborators. The embedding
    /// cache is passed in so it can be shared with indexing and across
    /// orchestrators.
    pub fn from_stores(
        config: Config,
        llm: Arc<dyn LlmProvider>,
        cache: Arc<EmbeddingCache>,
        store: Arc<dyn DocumentStore>,
        graph: Arc<dyn KnowledgeGraph>,
        synonyms: Arc<SynonymIndex>,
    ) -> Self {
        let reranker = Reranker::new(config.rerank.clone()).with_llm(Arc::clone(&llm));
        let engine = RetrievalEngine::new(Arc::clone(&store), cache, Arc::new(reranker));
        let expander = QueryExpander::new(synonyms)
            .with_graph(Arc::clone(&graph))
            .with_max_aliases(config.expansion.max_aliases_per_term);

        let context = ToolContext {
            engine: Arc::new(engine),
            store,
            graph,
            expander: Arc::new(expander),
            default_limit: config.agent.default_result_limit,
            llm_rerank: config.rerank.llm_rerank,
        };
        Self::new(config, llm, Arc::new(context))
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.inner.executor
    }

    /// Start a turn on the current runtime and return its event stream
    pub fn run_turn(&self, request: TurnRequest) -> UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::clone(&self.inner);
        let turn_id = Uuid::new_v4();
        let span = info_span!("turn", id = %turn_id, caller = %request.caller_id);
        tokio::spawn(async move { inner.run(request, TurnSink::new(tx)).await }.instrument(span));
        rx
    }

    /// Run a turn to completion and collect every event until the stream
    /// closes
    pub async fn run_turn_collect(&self, request: TurnRequest) -> Vec<Event> {
        let mut rx = self.run_turn(request);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }
}

impl Components {
    async fn run(&self, request: TurnRequest, sink: TurnSink) {
        let started = Instant::now();
        let mut machine = TurnStateMachine::new();
        info!(chars = request.question.chars().count(), "turn started");

        let outcome = self.drive(&request, &mut machine, &sink).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(outcome) => {
                info!(
                    latency_ms,
                    tool_calls = outcome.tool_calls,
                    citations = outcome.citations.len(),
                    replans = machine.replans(),
                    "turn completed"
                );
                sink.finish(Event::Done {
                    citations: outcome.citations,
                    latency_ms,
                    tool_calls: outcome.tool_calls,
                });
            }
            Err(err) => {
                let failed_in = machine.state();
                let _ = machine.apply(TurnEvent::Failure);
                match &err {
                    AgentError::RateLimited { .. } => warn!(error = %err, "turn rejected"),
                    _ => error!(error = %err, state = ?failed_in, latency_ms, "turn failed"),
                }
                sink.fail(&err);
            }
        }
    }

    async fn drive(
        &self,
        request: &TurnRequest,
        machine: &mut TurnStateMachine,
        sink: &TurnSink,
    ) -> Result<TurnOutcome> {
        let question = request.question.trim();

        machine.apply(TurnEvent::Begin)?;
        sink.status(Stage::Classifying, None);

        let decision = classify(question);
        debug!(is_chitchat = decision.is_chitchat, rule = ?decision.rule, "classified");

        if decision.is_chitchat {
            machine.apply(TurnEvent::ChitchatDetected)?;
            sink.status(Stage::Chitchat, None);
            self.reply_chitchat(question, &request.history, decision.template(), sink)
                .await?;
            machine.apply(TurnEvent::ReplyComplete)?;
            return Ok(TurnOutcome {
                citations: Vec::new(),
                tool_calls: 0,
            });
        }

        machine.apply(TurnEvent::RetrievalNeeded)?;
        self.limiter.acquire(&request.caller_id)?;
        machine.apply(TurnEvent::PermitGranted)?;

        let caller_hints = request
            .hints
            .as_ref()
            .map(TurnHints::from_value)
            .unwrap_or_default();
        let hints = caller_hints.or(detect_hints(question));

        let deadline = self.config.agent.turn_timeout();
        let results = tokio::time::timeout(deadline, self.retrieve(question, &request.history, &hints, machine, sink))
            .await
            .map_err(|_| AgentError::TurnTimeout {
                duration_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            })??;

        sink.status(Stage::Synthesis, None);
        self.synthesizer
            .synthesize(question, &request.history, &results, |text| sink.token(text))
            .await?;
        machine.apply(TurnEvent::ReplyComplete)?;

        Ok(TurnOutcome {
            citations: collect_sources(&results),
            tool_calls: results.len(),
        })
    }

    /// Template reply, or a single streamed LLM call
    async fn reply_chitchat(
        &self,
        question: &str,
        history: &[ConversationTurn],
        template: Option<&'static str>,
        sink: &TurnSink,
    ) -> Result<()> {
        if let Some(text) = template {
            sink.token(text);
            return Ok(());
        }

        let mut messages = vec![ChatMessage::system(chitchat_system_prompt())];
        messages.extend(
            recent_history(history, self.config.agent.history_turns)
                .iter()
                .map(ChatMessage::from),
        );
        messages.push(ChatMessage::user(question));
        let request = ChatRequest::new(TaskType::Chitchat, messages).with_max_tokens(128);

        stream_sanitized(self.llm.as_ref(), request, |text| sink.token(text)).await?;
        Ok(())
    }

    /// Planning, execution, evaluation and the optional corrective round
    async fn retrieve(
        &self,
        question: &str,
        history: &[ConversationTurn],
        hints: &TurnHints,
        machine: &mut TurnStateMachine,
        sink: &TurnSink,
    ) -> Result<Vec<ToolResult>> {
        sink.status(Stage::Planning, None);
        let plan = self.planner.plan(question, history, hints).await?;
        let mut plan = self.planner.finalize(plan, question, hints);
        machine.apply(TurnEvent::PlanReady)?;

        let mut results: Vec<ToolResult> = Vec::new();
        loop {
            sink.status(Stage::ToolExecution, Some(plan.tool_names().join(", ")));
            let round = self.executor.execute_plan(&plan.tool_calls).await;
            let failed = round.iter().filter(|r| !r.success).count();
            debug!(calls = round.len(), failed, "round finished");
            results.extend(round);
            machine.apply(TurnEvent::ToolsFinished)?;

            if !machine.can_replan() {
                machine.apply(TurnEvent::Sufficient)?;
                break;
            }

            sink.status(Stage::Evaluation, None);
            let evaluation = self.replanner.evaluate(question, &results).await;
            let Some(pattern) = evaluation.pattern else {
                machine.apply(TurnEvent::Sufficient)?;
                break;
            };

            machine.apply(TurnEvent::Insufficient)?;
            sink.status(Stage::Replanning, Some(pattern.to_string()));
            match self.replanner.correct(question, pattern, &results).await {
                Some(replan) => {
                    info!(strategy = %replan.strategy, "replanning");
                    plan = replan.plan;
                    machine.apply(TurnEvent::ReplanReady)?;
                }
                None => {
                    machine.apply(TurnEvent::NoCorrection)?;
                    break;
                }
            }
        }

        Ok(results)
    }
}
