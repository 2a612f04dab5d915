// Hybrid retrieval: vector + keyword candidates merged, then re-ranked
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::embedding::EmbeddingCache;
use crate::errors::Result;
use crate::rag::reranking::Reranker;
use crate::rag::retrieval::{DocumentSource, RetrievedDocument};
use crate::store::{DocumentFilter, DocumentStore};

/// Candidates fetched per requested result, before re-ranking
const CANDIDATE_FACTOR: usize = 3;

/// Which candidate generators a search uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    #[default]
    Hybrid,
    Keyword,
    Vector,
}

impl SearchStrategy {
    fn uses_vector(self) -> bool {
        matches!(self, SearchStrategy::Hybrid | SearchStrategy::Vector)
    }

    fn uses_keyword(self) -> bool {
        matches!(self, SearchStrategy::Hybrid | SearchStrategy::Keyword)
    }
}

/// Search parameters for retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Maximum number of results returned
    pub top_k: usize,
    pub strategy: SearchStrategy,
    /// Spend one LLM call on judging relevance
    pub llm_rerank: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: 10,
            strategy: SearchStrategy::Hybrid,
            llm_rerank: false,
        }
    }
}

/// Retrieval engine for hybrid document search
pub struct RetrievalEngine {
    store: Arc<dyn DocumentStore>,
    embeddings: Arc<EmbeddingCache>,
    reranker: Arc<Reranker>,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn DocumentStore>, embeddings: Arc<EmbeddingCache>, reranker: Arc<Reranker>) -> Self {
        Self {
            store,
            embeddings,
            reranker,
        }
    }

    /// Search for `query`, matching keywords against `terms` (already
    /// expanded by the caller) and respecting the structured `filter`.
    ///
    /// An embedding failure degrades to keyword-only retrieval.
    pub async fn search(
        &self,
        query: &str,
        terms: &[String],
        filter: &DocumentFilter,
        params: &SearchParams,
    ) -> Result<Vec<RetrievedDocument>> {
        let candidate_limit = params.top_k.max(1) * CANDIDATE_FACTOR;
        let mut merged: Vec<RetrievedDocument> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        if params.strategy.uses_vector() {
            match self.embeddings.get(query).await {
                Ok(Some(embedding)) => {
                    for (record, similarity) in self
                        .store
                        .vector_search(&embedding, filter, candidate_limit)
                        .await?
                    {
                        positions.insert(record.id.clone(), merged.len());
                        merged.push(
                            RetrievedDocument::from_record(record, DocumentSource::Vector)
                                .with_similarity(similarity),
                        );
                    }
                }
                Ok(None) => debug!("no embedding for query, skipping vector candidates"),
                Err(e) => warn!(error = %e, "query embedding failed, falling back to keyword search"),
            }
        }

        let keyword_only = !params.strategy.uses_keyword() && merged.is_empty() && params.strategy.uses_vector();
        if params.strategy.uses_keyword() || keyword_only {
            let keyword_filter = DocumentFilter {
                keywords: terms.to_vec(),
                ..filter.clone()
            };
            for record in self.store.keyword_search(&keyword_filter, candidate_limit).await? {
                if positions.contains_key(&record.id) {
                    continue;
                }
                positions.insert(record.id.clone(), merged.len());
                merged.push(RetrievedDocument::from_record(record, DocumentSource::Keyword));
            }
        }

        let mut ranked = if params.llm_rerank {
            self.reranker.rerank_with_llm(query, terms, merged).await
        } else {
            self.reranker.rerank(terms, merged)
        };
        ranked.truncate(params.top_k);

        debug!(
            strategy = ?params.strategy,
            results = ranked.len(),
            "hybrid search complete"
        );
        Ok(ranked)
    }

    /// Pure nearest-neighbour lookup; `rerank_score` mirrors similarity
    pub async fn similar_to_text(
        &self,
        text: &str,
        filter: &DocumentFilter,
        limit: usize,
        exclude_id: Option<&str>,
    ) -> Result<Vec<RetrievedDocument>> {
        let Some(embedding) = self.embeddings.get(text).await? else {
            return Ok(Vec::new());
        };

        let hits = self.store.vector_search(&embedding, filter, limit + 1).await?;
        Ok(hits
            .into_iter()
            .filter(|(record, _)| exclude_id != Some(record.id.as_str()))
            .take(limit)
            .map(|(record, similarity)| {
                let mut doc = RetrievedDocument::from_record(record, DocumentSource::Vector)
                    .with_similarity(similarity);
                doc.rerank_score = similarity;
                doc
            })
            .collect())
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}
