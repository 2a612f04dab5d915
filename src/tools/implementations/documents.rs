//! Document search tools: `search_documents` and `find_similar`

use tracing::debug;

use crate::errors::{AgentError, Result};
use crate::rag::retrieval::SearchParams;
use crate::store::DocumentFilter;
use crate::tools::implementations::split_terms;
use crate::tools::types::{
    date_arg, FindSimilarArgs, SearchDocumentsArgs, ToolContext, ToolName, ToolOutput,
};

/// Hybrid search with optional synonym/alias expansion and re-ranking
pub async fn search_documents(ctx: &ToolContext, args: SearchDocumentsArgs) -> Result<ToolOutput> {
    let tool = ToolName::SearchDocuments;

    let mut terms = args.keywords.clone();
    if terms.is_empty() {
        terms = split_terms(&args.query);
    }
    if args.expand.unwrap_or(false) {
        terms = ctx.expander.expand_search_terms(&terms).await;
    }

    let query = if args.query.trim().is_empty() {
        terms.join(" ")
    } else {
        args.query.clone()
    };

    let filter = DocumentFilter {
        keywords: Vec::new(),
        date_from: date_arg(tool, "date_from", args.date_from.as_deref())?,
        date_to: date_arg(tool, "date_to", args.date_to.as_deref())?,
        sender: args.sender.filter(|s| !s.trim().is_empty()),
        doc_type: args.doc_type.filter(|s| !s.trim().is_empty()),
    };

    let params = SearchParams {
        top_k: ctx.limit(args.limit),
        strategy: args.strategy.unwrap_or_default(),
        llm_rerank: args.llm_rerank.unwrap_or(ctx.llm_rerank),
    };

    let documents = ctx.engine.search(&query, &terms, &filter, &params).await?;
    debug!(terms = terms.len(), results = documents.len(), "search_documents");
    Ok(ToolOutput::Documents { documents })
}

/// Nearest neighbours of a stored document or of free text
pub async fn find_similar(ctx: &ToolContext, args: FindSimilarArgs) -> Result<ToolOutput> {
    let limit = ctx.limit(args.limit);

    let (text, exclude) = match (&args.document_id, &args.text) {
        (Some(id), _) => {
            let record = ctx
                .store
                .get_document(id)
                .await?
                .ok_or_else(|| AgentError::InvalidArguments {
                    tool: ToolName::FindSimilar.as_str().to_string(),
                    reason: format!("no document with id {}", id),
                })?;
            (record.text(), Some(id.as_str()))
        }
        (None, Some(text)) => (text.clone(), None),
        (None, None) => {
            return Err(AgentError::InvalidArguments {
                tool: ToolName::FindSimilar.as_str().to_string(),
                reason: "document_id or text is required".to_string(),
            })
        }
    };

    let documents = ctx
        .engine
        .similar_to_text(&text, &DocumentFilter::default(), limit, exclude)
        .await?;
    Ok(ToolOutput::Documents { documents })
}
