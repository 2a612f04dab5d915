pub mod scorer;

pub use scorer::{keyword_coverage, parse_ranking, Reranker};
