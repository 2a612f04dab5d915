//! Search-term expansion (synonym groups + knowledge-graph aliases)

pub mod expander;
pub mod synonyms;

pub use expander::{QueryExpander, DEFAULT_MAX_ALIASES};
pub use synonyms::SynonymIndex;
