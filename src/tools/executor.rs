//! Tool executor with bounded concurrency
//!
//! - Calls of one plan are dispatched concurrently, at most
//!   `max_concurrent` at a time (semaphore-bounded)
//! - Each call runs under its own timeout
//! - Results come back in plan order regardless of completion order
//! - A failing, panicking or timed-out call yields `success = false`;
//!   it never aborts the other calls

use futures_util::future::join_all;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::errors::{AgentError, Result};
use crate::tools::implementations;
use crate::tools::registry::ToolRegistry;
use crate::tools::types::{ToolCall, ToolContext, ToolOutput, ToolRequest, ToolResult};

/// Default concurrent tool calls
pub const MAX_PARALLEL_OPERATIONS: usize = 4;

/// Executes planned tool calls against the stores
pub struct ToolExecutor {
    context: Arc<ToolContext>,
    registry: ToolRegistry,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    call_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(context: Arc<ToolContext>, call_timeout: Duration) -> Self {
        Self::with_concurrency(context, call_timeout, MAX_PARALLEL_OPERATIONS)
    }

    pub fn with_concurrency(context: Arc<ToolContext>, call_timeout: Duration, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            context,
            registry: ToolRegistry::new(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            call_timeout,
        }
    }

    /// Execute one call. Never returns an error: every failure is folded
    /// into the `ToolResult`.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();

        let request = match ToolRequest::parse(call) {
            Ok(request) => request,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool call rejected");
                return ToolResult::failure(call.clone(), e.to_string(), start.elapsed());
            }
        };

        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return ToolResult::failure(call.clone(), format!("executor closed: {}", e), start.elapsed())
            }
        };

        let dispatch = AssertUnwindSafe(self.dispatch(request)).catch_unwind();
        let outcome = match tokio::time::timeout(self.call_timeout, dispatch).await {
            Ok(Ok(result)) => result,
            Ok(Err(_panic)) => Err(AgentError::Generic(format!("tool {} panicked", call.name))),
            Err(_) => Err(AgentError::ToolTimeout {
                tool: call.name.clone(),
                duration_ms: self.call_timeout.as_millis() as u64,
            }),
        };

        let elapsed = start.elapsed();
        match outcome {
            Ok(output) => {
                debug!(tool = %call.name, elapsed_ms = elapsed.as_millis() as u64, empty = output.is_empty(), "tool call finished");
                ToolResult::success(call.clone(), output, elapsed)
            }
            Err(e) => {
                warn!(tool = %call.name, elapsed_ms = elapsed.as_millis() as u64, error = %e, "tool call failed");
                ToolResult::failure(call.clone(), e.to_string(), elapsed)
            }
        }
    }

    /// Execute every call of a plan concurrently; results keep plan order
    pub async fn execute_plan(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.execute(call))).await
    }

    async fn dispatch(&self, request: ToolRequest) -> Result<ToolOutput> {
        let ctx = self.context.as_ref();
        match request {
            ToolRequest::SearchDocuments(args) => implementations::search_documents(ctx, args).await,
            ToolRequest::SearchDispatchOrders(args) => implementations::search_dispatch_orders(ctx, args).await,
            ToolRequest::SearchEntities(args) => implementations::search_entities(ctx, args).await,
            ToolRequest::GetEntityDetail(args) => implementations::get_entity_detail(ctx, args).await,
            ToolRequest::FindSimilar(args) => implementations::find_similar(ctx, args).await,
            ToolRequest::GetStatistics(args) => implementations::get_statistics(ctx, args).await,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn max_parallel_operations(&self) -> usize {
        self.max_concurrent
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}
