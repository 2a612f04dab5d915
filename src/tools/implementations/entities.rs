//! Knowledge-graph tools: `search_entities` and `get_entity_detail`

use tracing::debug;

use crate::errors::Result;
use crate::rag::retrieval::{DocumentSource, RetrievedDocument};
use crate::tools::types::{GetEntityDetailArgs, SearchEntitiesArgs, ToolContext, ToolOutput};

/// Linked documents fetched per entity detail
const MAX_LINKED_DOCUMENTS: usize = 10;

pub async fn search_entities(ctx: &ToolContext, args: SearchEntitiesArgs) -> Result<ToolOutput> {
    let terms = if args.expand.unwrap_or(true) {
        ctx.expander.expand_term(&args.name).await
    } else {
        vec![args.name.clone()]
    };

    let entities = ctx
        .graph
        .search_entities(&terms, args.entity_type.as_deref(), ctx.limit(args.limit))
        .await?;

    debug!(name = %args.name, found = entities.len(), "search_entities");
    Ok(ToolOutput::Entities { entities })
}

/// Resolve a name to an entity id: canonical name, then alias, then fuzzy search
async fn resolve_entity_id(ctx: &ToolContext, name: &str) -> Result<Option<String>> {
    if let Some(entity) = ctx.graph.entities_named(name).await?.into_iter().next() {
        return Ok(Some(entity.id));
    }
    if let Some(alias) = ctx.graph.aliases_named(name).await?.into_iter().next() {
        return Ok(Some(alias.entity_id));
    }
    Ok(ctx
        .graph
        .search_entities(&[name.to_string()], None, 1)
        .await?
        .into_iter()
        .next()
        .map(|e| e.id))
}

pub async fn get_entity_detail(ctx: &ToolContext, args: GetEntityDetailArgs) -> Result<ToolOutput> {
    let entity_id = match (&args.entity_id, &args.name) {
        (Some(id), _) => Some(id.clone()),
        (None, Some(name)) => resolve_entity_id(ctx, name).await?,
        (None, None) => None,
    };

    let Some(entity_id) = entity_id else {
        return Ok(ToolOutput::Entities { entities: Vec::new() });
    };
    let Some(detail) = ctx.graph.entity_detail(&entity_id).await? else {
        return Ok(ToolOutput::Entities { entities: Vec::new() });
    };

    let mut documents = Vec::new();
    for id in detail.document_ids.iter().take(MAX_LINKED_DOCUMENTS) {
        if let Some(record) = ctx.store.get_document(id).await? {
            let mut doc = RetrievedDocument::from_record(record, DocumentSource::Graph);
            doc.rerank_score = 1.0;
            documents.push(doc);
        }
    }

    Ok(ToolOutput::EntityDetail { detail, documents })
}
