// Context builder for retrieval-augmented synthesis prompts
use serde::{Deserialize, Serialize};

use crate::rag::retrieval::RetrievedDocument;
use crate::store::{FIELD_CONTENT, FIELD_DATE, FIELD_DOC_TYPE, FIELD_SENDER, FIELD_STATUS};

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Character budget for all snippets together
    pub max_context_chars: usize,
    /// Characters of body text kept per document
    pub snippet_chars: usize,
    /// Show rerank scores next to each document
    pub include_scores: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 6000,
            snippet_chars: 300,
            include_scores: false,
        }
    }
}

/// Assembled context for prompt augmentation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub document_count: usize,
    /// CJK text runs close to one token per character
    pub estimated_tokens: usize,
    pub document_ids: Vec<String>,
}

/// Context builder for assembling retrieved snippets
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Format documents in order until the character budget is spent
    pub fn build(&self, documents: &[RetrievedDocument]) -> AssembledContext {
        let mut parts = Vec::new();
        let mut used = 0;
        let mut ids = Vec::new();

        for doc in documents {
            let formatted = self.format_document(parts.len() + 1, doc);
            let cost = formatted.chars().count();
            if used + cost > self.config.max_context_chars {
                break;
            }

            used += cost;
            ids.push(doc.id.clone());
            parts.push(formatted);
        }

        AssembledContext {
            text: parts.join("\n\n"),
            document_count: parts.len(),
            estimated_tokens: used,
            document_ids: ids,
        }
    }

    fn format_document(&self, index: usize, doc: &RetrievedDocument) -> String {
        let mut header = format!("[{}] {}", index, doc.label());
        if self.config.include_scores {
            header.push_str(&format!(" (相關度 {:.2})", doc.rerank_score));
        }

        let meta: Vec<String> = [
            ("發文單位", FIELD_SENDER),
            ("日期", FIELD_DATE),
            ("類型", FIELD_DOC_TYPE),
            ("狀態", FIELD_STATUS),
        ]
        .iter()
        .filter_map(|(name, key)| doc.field(key).map(|v| format!("{}：{}", name, v)))
        .collect();

        let mut out = header;
        if !meta.is_empty() {
            out.push('\n');
            out.push_str(&meta.join("｜"));
        }

        if let Some(body) = doc.field(FIELD_CONTENT) {
            let snippet: String = body.chars().take(self.config.snippet_chars).collect();
            let ellipsis = if body.chars().count() > self.config.snippet_chars {
                "…"
            } else {
                ""
            };
            out.push_str(&format!("\n摘要：{}{}", snippet, ellipsis));
        }

        out
    }

    /// Prepend the assembled context to `prompt`; unchanged when nothing fits
    pub fn augment_prompt(&self, prompt: &str, documents: &[RetrievedDocument]) -> String {
        let context = self.build(documents);
        if context.document_count == 0 {
            return prompt.to_string();
        }
        format!("參考文件：\n{}\n\n{}", context.text, prompt)
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}
