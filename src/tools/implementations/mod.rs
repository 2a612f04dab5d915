//! Tool implementations
//!
//! Every tool is read-only and safe to cancel at any await point.

pub mod dispatch;
pub mod documents;
pub mod entities;
pub mod statistics;

pub use dispatch::search_dispatch_orders;
pub use documents::{find_similar, search_documents};
pub use entities::{get_entity_detail, search_entities};
pub use statistics::get_statistics;

const TERM_SEPARATORS: &[char] = &[
    ' ', '\t', '\n', ',', '，', '、', ';', '；', '。', '?', '？', '!', '！',
];

/// Split free text into search terms on whitespace and CJK/ASCII punctuation
pub fn split_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for part in query.split(TERM_SEPARATORS) {
        let part = part.trim();
        if !part.is_empty() && !terms.iter().any(|t| t == part) {
            terms.push(part.to_string());
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_terms() {
        assert_eq!(split_terms("道路 養護，工務局、道路"), vec!["道路", "養護", "工務局"]);
        assert!(split_terms(" ，。 ").is_empty());
        assert_eq!(split_terms("路燈維修"), vec!["路燈維修"]);
    }
}
