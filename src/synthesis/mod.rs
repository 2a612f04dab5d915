//! Answer synthesis: prompt assembly, streaming and sanitizing

pub mod sanitize;
pub mod synthesizer;

pub use sanitize::{sanitize_answer, StreamSanitizer};
pub use synthesizer::{collect_documents, stream_sanitized, summarize_results, Synthesizer, EMPTY_ANSWER_FALLBACK};
