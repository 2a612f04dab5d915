//! Query expansion
//!
//! Widens literal search terms with synonym-group members and knowledge
//! graph aliases. Expansion is best effort: any lookup failure degrades to
//! the original terms.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::expansion::synonyms::SynonymIndex;
use crate::store::KnowledgeGraph;

/// Default cap on aliases collected per term
pub const DEFAULT_MAX_ALIASES: usize = 10;

/// Synonym + entity-alias expander
pub struct QueryExpander {
    synonyms: Arc<SynonymIndex>,
    graph: Option<Arc<dyn KnowledgeGraph>>,
    max_aliases_per_term: usize,
}

/// Push `term` unless an equal (trimmed) term is already present
fn push_unique(out: &mut Vec<String>, term: &str) {
    let term = term.trim();
    if !term.is_empty() && !out.iter().any(|t| t == term) {
        out.push(term.to_string());
    }
}

impl QueryExpander {
    pub fn new(synonyms: Arc<SynonymIndex>) -> Self {
        Self {
            synonyms,
            graph: None,
            max_aliases_per_term: DEFAULT_MAX_ALIASES,
        }
    }

    pub fn with_graph(mut self, graph: Arc<dyn KnowledgeGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_max_aliases(mut self, max: usize) -> Self {
        self.max_aliases_per_term = max;
        self
    }

    pub fn synonyms(&self) -> &SynonymIndex {
        &self.synonyms
    }

    /// `term` followed by the canonical names and aliases of every entity
    /// that has `term` as an alias or as its canonical name, capped at
    /// `max_aliases_per_term` additions.
    pub async fn expand_entity_aliases(&self, term: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        push_unique(&mut out, term);

        let Some(graph) = &self.graph else {
            return Ok(out);
        };

        let mut entity_ids: Vec<String> = graph
            .aliases_named(term)
            .await?
            .into_iter()
            .map(|a| a.entity_id)
            .collect();
        for entity in graph.entities_named(term).await? {
            if !entity_ids.contains(&entity.id) {
                entity_ids.push(entity.id);
            }
        }

        if entity_ids.is_empty() {
            return Ok(out);
        }

        let limit = out.len() + self.max_aliases_per_term;
        for entity in graph.entities_by_id(&entity_ids).await? {
            if out.len() >= limit {
                break;
            }
            push_unique(&mut out, &entity.canonical_name);
        }
        for alias in graph.aliases_for(&entity_ids).await? {
            if out.len() >= limit {
                break;
            }
            push_unique(&mut out, &alias.alias);
        }

        Ok(out)
    }

    /// Original terms first, then synonyms, then entity aliases; no duplicates.
    pub async fn expand_search_terms(&self, terms: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for term in terms {
            push_unique(&mut out, term);
        }
        let originals = out.clone();

        for term in &originals {
            for synonym in self.synonyms.find_synonyms(term) {
                push_unique(&mut out, &synonym);
            }
        }

        for term in &originals {
            match self.expand_entity_aliases(term).await {
                Ok(aliases) => {
                    for alias in aliases {
                        push_unique(&mut out, &alias);
                    }
                }
                Err(e) => {
                    warn!(term = %term, error = %e, "alias expansion failed, using original term");
                }
            }
        }

        debug!(original = originals.len(), expanded = out.len(), "search terms expanded");
        out
    }

    /// Convenience wrapper for a single term
    pub async fn expand_term(&self, term: &str) -> Vec<String> {
        self.expand_search_terms(&[term.to_string()]).await
    }
}
