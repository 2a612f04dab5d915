//! Final answer synthesis
//!
//! Builds the synthesis prompt from recent history, a digest of every tool
//! result and the retrieved snippets, then streams the model's answer
//! through the sanitizer.

use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TaskType};
use crate::rag::context::ContextBuilder;
use crate::rag::retrieval::RetrievedDocument;
use crate::synthesis::sanitize::StreamSanitizer;
use crate::tools::types::ToolResult;
use crate::types::{recent_history, ConversationTurn};

/// Emitted when sanitizing leaves nothing of the model's answer
pub const EMPTY_ANSWER_FALLBACK: &str = "抱歉，目前無法根據查詢結果產生回答，請換個方式再問一次。";

const SYNTHESIS_SYSTEM_PROMPT: &str = "你是公文檢索助理。請只根據提供的工具結果與參考文件，用繁體中文回答使用者問題。\n\
規則：\n\
1. 不可編造文件、文號、日期或數字。\n\
2. 引用文件時標註編號，例如 [1]。\n\
3. 查無資料時直接說明查無資料，並建議調整查詢條件。\n\
4. 直接給出答案，不要描述你的思考過程。";

/// Successful documents of all results, first occurrence of each id kept
pub fn collect_documents(results: &[ToolResult]) -> Vec<RetrievedDocument> {
    let mut seen = HashSet::new();
    results
        .iter()
        .flat_map(|r| r.documents())
        .filter(|d| seen.insert(d.id.clone()))
        .cloned()
        .collect()
}

/// Plain-text digest of each tool result
pub fn summarize_results(results: &[ToolResult]) -> String {
    if results.is_empty() {
        return "（未執行任何查詢）".to_string();
    }
    results
        .iter()
        .map(|r| match (&r.data, r.success) {
            (Some(data), true) => format!("- {}：{}", r.tool_call.name, data.summary()),
            _ => format!("- {}：查詢失敗", r.tool_call.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Synthesizer {
    llm: Arc<dyn LlmProvider>,
    context: ContextBuilder,
    history_turns: usize,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, history_turns: usize) -> Self {
        Self {
            llm,
            context: ContextBuilder::new(),
            history_turns,
        }
    }

    pub fn with_context_builder(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }

    pub fn build_request(&self, question: &str, history: &[ConversationTurn], results: &[ToolResult]) -> ChatRequest {
        let documents = collect_documents(results);
        let prompt = format!(
            "工具結果摘要：\n{}\n\n問題：{}",
            summarize_results(results),
            question
        );
        let prompt = if documents.is_empty() {
            format!("參考文件：（無）\n\n{}", prompt)
        } else {
            self.context.augment_prompt(&prompt, &documents)
        };

        let mut messages = vec![ChatMessage::system(SYNTHESIS_SYSTEM_PROMPT)];
        messages.extend(recent_history(history, self.history_turns).iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(prompt));
        ChatRequest::new(TaskType::Synthesis, messages)
    }

    /// Stream the sanitized answer through `emit` and return the full text
    pub async fn synthesize<F>(
        &self,
        question: &str,
        history: &[ConversationTurn],
        results: &[ToolResult],
        emit: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        let request = self.build_request(question, history, results);
        stream_sanitized(self.llm.as_ref(), request, emit).await
    }
}

/// Drive a provider stream through a `StreamSanitizer`, emitting every
/// non-empty piece. Falls back to a fixed sentence when nothing survives.
pub async fn stream_sanitized<F>(llm: &dyn LlmProvider, request: ChatRequest, mut emit: F) -> Result<String>
where
    F: FnMut(&str),
{
    let mut stream = llm.stream(request).await?;
    let mut sanitizer = StreamSanitizer::new();
    let mut answer = String::new();

    while let Some(chunk) = stream.next().await {
        let piece = sanitizer.push(&chunk?);
        if !piece.is_empty() {
            emit(&piece);
            answer.push_str(&piece);
        }
    }

    let tail = sanitizer.finish();
    if !tail.is_empty() {
        emit(&tail);
        answer.push_str(&tail);
    }

    if answer.trim().is_empty() {
        warn!("answer empty after sanitizing, using fallback");
        emit(EMPTY_ANSWER_FALLBACK);
        answer.push_str(EMPTY_ANSWER_FALLBACK);
    }

    debug!(chars = answer.chars().count(), "answer streamed");
    Ok(answer)
}
