//! Hybrid re-ranking
//!
//! ```text
//! final = w_vector · similarity + w_keyword · keyword_coverage [+ w_llm · llm_relevance]
//! ```
//!
//! The LLM term only participates when a caller explicitly asks for the
//! batch LLM judgment; otherwise the first two terms are used unscaled.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::config::RerankConfig;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TaskType};
use crate::rag::retrieval::RetrievedDocument;

/// Partial credit for a term that only overlaps by character bigram
const BIGRAM_DISCOUNT: f32 = 0.7;

/// Term length beyond which weight stops growing
const LENGTH_WEIGHT_CAP: usize = 6;

/// Characters of each candidate shown to the LLM judge
const LLM_SNIPPET_CHARS: usize = 120;

const STOP_WORDS: &[&str] = &[
    "一下", "相關", "有關", "關於", "資料", "哪些", "什麼", "請問", "幫我", "我們", "你們", "這個",
    "那個", "以及", "還有", "可以", "是否", "the", "and", "for", "with", "about", "what", "which",
    "from", "that", "this", "are", "is", "of", "to", "in", "on",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

fn integer_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid integer pattern"))
}

fn term_weight(char_len: usize) -> f32 {
    1.0 + 0.25 * (char_len.min(LENGTH_WEIGHT_CAP) as f32 - 2.0)
}

fn char_bigrams(chars: &[char]) -> impl Iterator<Item = (char, char)> + '_ {
    chars.windows(2).map(|w| (w[0], w[1]))
}

/// Fraction of weighted search terms found in `text`, in `[0, 1]`.
///
/// Terms under two characters and stop-words are skipped. Longer terms
/// weigh more (capped). A verbatim match earns the full weight; a shared
/// character bigram earns 70% of it.
pub fn keyword_coverage(terms: &[String], text: &str) -> f32 {
    let text = text.to_lowercase();
    let text_chars: Vec<char> = text.chars().collect();
    let text_bigrams: HashSet<(char, char)> = char_bigrams(&text_chars).collect();

    let mut total = 0.0f32;
    let mut earned = 0.0f32;

    for term in terms {
        let term = term.trim().to_lowercase();
        let chars: Vec<char> = term.chars().collect();
        if chars.len() < 2 || stop_words().contains(term.as_str()) {
            continue;
        }

        let weight = term_weight(chars.len());
        total += weight;

        if text.contains(&term) {
            earned += weight;
        } else if char_bigrams(&chars).any(|b| text_bigrams.contains(&b)) {
            earned += weight * BIGRAM_DISCOUNT;
        }
    }

    if total == 0.0 {
        0.0
    } else {
        (earned / total).clamp(0.0, 1.0)
    }
}

/// Full-width digits (U+FF10..U+FF19) to ASCII
fn to_ascii_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            _ => c,
        })
        .collect()
}

/// Extract a 0-based ranking from free-form model output. Integers are read
/// as 1-based positions; zero, out-of-range and repeated positions are dropped.
pub fn parse_ranking(output: &str, candidates: usize) -> Vec<usize> {
    let output = to_ascii_digits(output);
    let mut seen = HashSet::new();
    integer_pattern()
        .find_iter(&output)
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .filter(|&n| n >= 1 && n <= candidates)
        .map(|n| n - 1)
        .filter(|idx| seen.insert(*idx))
        .collect()
}

/// Hybrid re-ranker
pub struct Reranker {
    config: RerankConfig,
    llm: Option<Arc<dyn LlmProvider>>,
}

impl Reranker {
    pub fn new(config: RerankConfig) -> Self {
        Self { config, llm: None }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn config(&self) -> &RerankConfig {
        &self.config
    }

    /// Score with vector + keyword signals and stable-sort descending
    pub fn rerank(&self, terms: &[String], documents: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
        self.score_and_sort(terms, documents, None)
    }

    /// Like [`rerank`](Self::rerank), plus one LLM judgment call whose
    /// ranking becomes the third signal. Falls back to two signals when the
    /// judgment is unusable.
    pub async fn rerank_with_llm(
        &self,
        question: &str,
        terms: &[String],
        documents: Vec<RetrievedDocument>,
    ) -> Vec<RetrievedDocument> {
        let Some(order) = self.llm_order(question, &documents).await else {
            return self.rerank(terms, documents);
        };

        // Rank r of k judged candidates maps to relevance 1 - r/k
        let judged = order.len() as f32;
        let relevance: HashMap<String, f32> = order
            .iter()
            .enumerate()
            .map(|(rank, &idx)| (documents[idx].id.clone(), 1.0 - rank as f32 / judged))
            .collect();

        self.score_and_sort(terms, documents, Some(&relevance))
    }

    fn score_and_sort(
        &self,
        terms: &[String],
        mut documents: Vec<RetrievedDocument>,
        llm_relevance: Option<&HashMap<String, f32>>,
    ) -> Vec<RetrievedDocument> {
        for doc in &mut documents {
            doc.keyword_score = keyword_coverage(terms, &doc.text());
            let mut score =
                self.config.w_vector * doc.similarity + self.config.w_keyword * doc.keyword_score;
            if let Some(relevance) = llm_relevance {
                score += self.config.w_llm * relevance.get(&doc.id).copied().unwrap_or(0.0);
            }
            doc.rerank_score = score;
        }

        // sort_by is stable: ties keep retrieval order
        documents.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        documents
    }

    /// Ask the LLM to order the candidates. Never fails: an unusable answer
    /// keeps the original top-`n` slice.
    pub async fn llm_rerank(
        &self,
        question: &str,
        documents: &[RetrievedDocument],
        top_n: usize,
    ) -> Vec<RetrievedDocument> {
        let Some(order) = self.llm_order(question, documents).await else {
            return documents.iter().take(top_n).cloned().collect();
        };

        let mut ranked: Vec<RetrievedDocument> = order.iter().map(|&i| documents[i].clone()).collect();
        for (idx, doc) in documents.iter().enumerate() {
            if ranked.len() >= top_n {
                break;
            }
            if !order.contains(&idx) {
                ranked.push(doc.clone());
            }
        }
        ranked.truncate(top_n);
        ranked
    }

    async fn llm_order(&self, question: &str, documents: &[RetrievedDocument]) -> Option<Vec<usize>> {
        let llm = self.llm.as_ref()?;
        if documents.is_empty() {
            return None;
        }

        let candidates = documents.len().min(self.config.max_llm_candidates.max(1));
        let listing: Vec<String> = documents[..candidates]
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let snippet: String = doc.text().chars().take(LLM_SNIPPET_CHARS).collect();
                format!("{}. {} | {}", i + 1, doc.label(), snippet.replace('\n', " "))
            })
            .collect();

        let prompt = format!(
            "問題：{}\n\n候選文件：\n{}\n\n請依與問題的相關程度排序，只回傳編號，以逗號分隔（例如：3,1,2），不要輸出其他文字。",
            question,
            listing.join("\n")
        );
        let request = ChatRequest::new(TaskType::Rerank, vec![ChatMessage::user(prompt)]);

        let output = match llm.complete(request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "llm rerank call failed, keeping retrieval order");
                return None;
            }
        };

        let order = parse_ranking(&output, candidates);
        if order.is_empty() {
            debug!(output = %output, "llm rerank output had no usable indices");
            return None;
        }
        Some(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AgentError, Result};
    use crate::rag::retrieval::DocumentSource;
    use crate::store::{Fields, FIELD_SUBJECT};
    use async_trait::async_trait;
    use quickcheck_macros::quickcheck;

    fn doc(id: &str, subject: &str, similarity: f32) -> RetrievedDocument {
        let mut fields = Fields::new();
        fields.insert(FIELD_SUBJECT.to_string(), subject.to_string());
        RetrievedDocument {
            id: id.to_string(),
            fields,
            similarity,
            keyword_score: 0.0,
            rerank_score: 0.0,
            source: DocumentSource::Vector,
        }
    }

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    struct FixedLlm(String);

    #[async_trait]
    impl LlmProvider for FixedLlm {
        async fn complete(&self, _request: ChatRequest) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct BrokenLlm;

    #[async_trait]
    impl LlmProvider for BrokenLlm {
        async fn complete(&self, _request: ChatRequest) -> Result<String> {
            Err(AgentError::LlmError("unreachable".into()))
        }
    }

    #[test]
    fn test_coverage_verbatim() {
        assert_eq!(keyword_coverage(&terms(&["道路", "養護"]), "道路養護工程"), 1.0);
    }

    #[test]
    fn test_coverage_partial_bigram() {
        // "道路工程" is absent verbatim but shares the bigram "道路"
        let score = keyword_coverage(&terms(&["道路工程"]), "道路養護");
        assert!((score - BIGRAM_DISCOUNT).abs() < 1e-6);
    }

    #[test]
    fn test_coverage_weights_longer_terms() {
        let text = "臺北市政府工務局函";
        let long_hit = keyword_coverage(&terms(&["臺北市政府工務局", "環保"]), text);
        let short_hit = keyword_coverage(&terms(&["環保局處", "工務"]), text);
        assert!(long_hit > short_hit);
    }

    #[test]
    fn test_coverage_skips_short_and_stop_words() {
        assert_eq!(keyword_coverage(&terms(&["的", "a", "相關", "the"]), "相關 the a"), 0.0);
        assert_eq!(keyword_coverage(&[], "anything"), 0.0);
    }

    #[test]
    fn test_coverage_case_insensitive() {
        assert_eq!(keyword_coverage(&terms(&["MRT"]), "mrt station"), 1.0);
    }

    #[quickcheck]
    fn prop_coverage_bounded(terms: Vec<String>, text: String) -> bool {
        let score = keyword_coverage(&terms, &text);
        (0.0..=1.0).contains(&score)
    }

    #[quickcheck]
    fn prop_coverage_idempotent(terms: Vec<String>, text: String) -> bool {
        keyword_coverage(&terms, &text) == keyword_coverage(&terms, &text)
    }

    #[quickcheck]
    fn prop_stop_words_score_zero(picks: Vec<usize>, text: String) -> bool {
        let terms: Vec<String> = picks
            .iter()
            .map(|i| STOP_WORDS[i % STOP_WORDS.len()].to_string())
            .collect();
        keyword_coverage(&terms, &text) == 0.0
    }

    #[test]
    fn test_parse_ranking() {
        assert_eq!(parse_ranking("3, 1, 2", 3), vec![2, 0, 1]);
        assert_eq!(parse_ranking("排序：2,2,0,9,1", 3), vec![1, 0]);
        assert!(parse_ranking("no numbers", 3).is_empty());
    }

    #[test]
    fn test_parse_ranking_full_width_digits() {
        assert_eq!(parse_ranking("１,３", 3), vec![0, 2]);
        assert_eq!(parse_ranking("順序：３、１２、２", 3), vec![2, 1]);
    }

    #[test]
    fn test_rerank_sorts_and_is_stable() {
        let reranker = Reranker::new(RerankConfig::default());
        let docs = vec![
            doc("a", "無關內容", 0.2),
            doc("b", "道路養護", 0.2),
            doc("c", "其他", 0.2),
        ];

        let ranked = reranker.rerank(&terms(&["道路"]), docs);
        assert_eq!(ranked[0].id, "b");
        // a and c tie; retrieval order kept
        assert_eq!(ranked[1].id, "a");
        assert_eq!(ranked[2].id, "c");
        assert!((ranked[0].rerank_score - (0.5 * 0.2 + 0.3 * 1.0)).abs() < 1e-6);
        assert_eq!(ranked[0].keyword_score, 1.0);
    }

    #[tokio::test]
    async fn test_llm_rerank_applies_order() {
        let reranker = Reranker::new(RerankConfig::default()).with_llm(Arc::new(FixedLlm("3,1".into())));
        let docs = vec![doc("a", "x", 0.9), doc("b", "y", 0.8), doc("c", "z", 0.7)];

        let ranked = reranker.llm_rerank("q", &docs, 2).await;
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "c");
        assert_eq!(ranked[1].id, "a");
    }

    #[tokio::test]
    async fn test_llm_rerank_fills_from_original_order() {
        let reranker = Reranker::new(RerankConfig::default()).with_llm(Arc::new(FixedLlm("2".into())));
        let docs = vec![doc("a", "x", 0.9), doc("b", "y", 0.8), doc("c", "z", 0.7)];

        let ranked = reranker.llm_rerank("q", &docs, 3).await;
        let ids: Vec<&str> = ranked.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_llm_rerank_unparsable_keeps_original() {
        let reranker =
            Reranker::new(RerankConfig::default()).with_llm(Arc::new(FixedLlm("I cannot rank these.".into())));
        let docs = vec![doc("a", "x", 0.9), doc("b", "y", 0.8), doc("c", "z", 0.7)];

        let ranked = reranker.llm_rerank("q", &docs, 2).await;
        let ids: Vec<&str> = ranked.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_llm_rerank_provider_error_never_fails() {
        let reranker = Reranker::new(RerankConfig::default()).with_llm(Arc::new(BrokenLlm));
        let docs = vec![doc("a", "x", 0.9)];
        assert_eq!(reranker.llm_rerank("q", &docs, 5).await.len(), 1);
    }

    #[tokio::test]
    async fn test_rerank_with_llm_adds_third_signal() {
        let reranker = Reranker::new(RerankConfig::default()).with_llm(Arc::new(FixedLlm("2,1".into())));
        let docs = vec![doc("a", "x", 0.5), doc("b", "y", 0.5)];

        let ranked = reranker.rerank_with_llm("q", &[], docs).await;
        assert_eq!(ranked[0].id, "b");
        assert!((ranked[0].rerank_score - (0.25 + 0.2)).abs() < 1e-6);
        assert!((ranked[1].rerank_score - (0.25 + 0.1)).abs() < 1e-6);
    }
}
