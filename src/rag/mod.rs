// Retrieval-augmented generation building blocks
//
// Components:
// - Retrieval Engine: hybrid vector + keyword candidate generation
// - Re-ranking: vector / keyword-coverage / optional LLM scoring
// - Context Builder: snippets for the synthesis prompt

pub mod context;
pub mod reranking;
pub mod retrieval;

pub use context::{AssembledContext, ContextBuilder, ContextConfig};
pub use reranking::{keyword_coverage, Reranker};
pub use retrieval::{DocumentSource, RetrievalEngine, RetrievedDocument, SearchParams, SearchStrategy};
