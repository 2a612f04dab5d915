// Retrieval types and the hybrid search engine
pub mod engine;

use serde::{Deserialize, Serialize};

use crate::store::{DocumentRecord, Fields};
use crate::types::SourceRef;

pub use engine::{RetrievalEngine, SearchParams, SearchStrategy};

/// Where a candidate document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    Vector,
    Keyword,
    Graph,
}

/// Candidate document with its retrieval and ranking scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub fields: Fields,
    /// Cosine similarity to the query, 0 for non-vector hits
    pub similarity: f32,
    pub keyword_score: f32,
    pub rerank_score: f32,
    pub source: DocumentSource,
}

impl RetrievedDocument {
    pub fn from_record(record: DocumentRecord, source: DocumentSource) -> Self {
        Self {
            id: record.id,
            fields: record.fields,
            similarity: 0.0,
            keyword_score: 0.0,
            rerank_score: 0.0,
            source,
        }
    }

    pub fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = similarity;
        self
    }

    /// Strongest single signal, each on its own 0..1 scale. The weighted
    /// `rerank_score` alone caps keyword-only hits at `w_keyword`.
    pub fn relevance(&self) -> f32 {
        self.similarity.max(self.keyword_score).max(self.rerank_score)
    }

    /// Back to a plain record view (cheap clone of the fields)
    pub fn record(&self) -> DocumentRecord {
        DocumentRecord {
            id: self.id.clone(),
            fields: self.fields.clone(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn label(&self) -> String {
        self.record().label()
    }

    pub fn text(&self) -> String {
        self.fields
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            document_id: self.id.clone(),
            label: self.label(),
        }
    }
}
