//! `search_dispatch_orders`: structured search over dispatch orders

use crate::errors::Result;
use crate::rag::keyword_coverage;
use crate::rag::retrieval::{DocumentSource, RetrievedDocument};
use crate::store::DispatchFilter;
use crate::tools::implementations::split_terms;
use crate::tools::types::{date_arg, SearchDispatchArgs, ToolContext, ToolName, ToolOutput};

pub async fn search_dispatch_orders(ctx: &ToolContext, args: SearchDispatchArgs) -> Result<ToolOutput> {
    let tool = ToolName::SearchDispatchOrders;

    let mut keywords = args.keywords.clone();
    if keywords.is_empty() {
        if let Some(query) = &args.query {
            keywords = split_terms(query);
        }
    }

    let filter = DispatchFilter {
        keywords: keywords.clone(),
        status: args.status.filter(|s| !s.trim().is_empty()),
        assignee: args.assignee.filter(|s| !s.trim().is_empty()),
        date_from: date_arg(tool, "date_from", args.date_from.as_deref())?,
        date_to: date_arg(tool, "date_to", args.date_to.as_deref())?,
    };

    let records = ctx
        .store
        .search_dispatch_orders(&filter, ctx.limit(args.limit))
        .await?;

    let documents = records
        .into_iter()
        .map(|record| {
            let mut doc = RetrievedDocument::from_record(record, DocumentSource::Keyword);
            doc.keyword_score = keyword_coverage(&keywords, &doc.text());
            // Structured filters match exactly, so every row counts as relevant
            doc.rerank_score = 1.0;
            doc
        })
        .collect();

    Ok(ToolOutput::Documents { documents })
}
