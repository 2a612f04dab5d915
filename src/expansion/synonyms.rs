//! Synonym dictionary index
//!
//! Groups are symmetric: every member maps to every other member of the
//! same group. The first entry of a group is its canonical form, used when
//! an abbreviation is substituted for display.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};
use tracing::info;

use crate::errors::Result;
use crate::store::SynonymSource;

#[derive(Debug, Default)]
struct IndexState {
    groups: Vec<Vec<String>>,
    /// normalized term -> indices into `groups`
    by_term: HashMap<String, Vec<usize>>,
}

impl IndexState {
    fn build(groups: Vec<Vec<String>>) -> Self {
        let mut cleaned: Vec<Vec<String>> = Vec::with_capacity(groups.len());
        for group in groups {
            let mut members: Vec<String> = Vec::with_capacity(group.len());
            for term in group {
                let term = term.trim().to_string();
                if !term.is_empty() && !members.iter().any(|m| normalize(m) == normalize(&term)) {
                    members.push(term);
                }
            }
            if !members.is_empty() {
                cleaned.push(members);
            }
        }

        let mut by_term: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, group) in cleaned.iter().enumerate() {
            for term in group {
                by_term.entry(normalize(term)).or_default().push(idx);
            }
        }

        Self {
            groups: cleaned,
            by_term,
        }
    }
}

fn normalize(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Hot-reloadable synonym lookup
#[derive(Debug, Default)]
pub struct SynonymIndex {
    state: RwLock<IndexState>,
}

impl SynonymIndex {
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        Self {
            state: RwLock::new(IndexState::build(groups)),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn state(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Every member of every group containing `term`, the term included,
    /// without duplicates. Empty when the term is in no group.
    pub fn find_synonyms(&self, term: &str) -> Vec<String> {
        let state = self.state();
        let Some(group_ids) = state.by_term.get(&normalize(term)) else {
            return Vec::new();
        };

        let mut out: Vec<String> = Vec::new();
        for &idx in group_ids {
            for member in &state.groups[idx] {
                if !out.iter().any(|m| normalize(m) == normalize(member)) {
                    out.push(member.clone());
                }
            }
        }
        out
    }

    /// First entry of the first group containing `term`
    pub fn canonical_form(&self, term: &str) -> Option<String> {
        let state = self.state();
        state
            .by_term
            .get(&normalize(term))
            .and_then(|ids| ids.first())
            .and_then(|&idx| state.groups[idx].first().cloned())
    }

    /// Canonical form if known, otherwise the term itself
    pub fn display_form(&self, term: &str) -> String {
        self.canonical_form(term).unwrap_or_else(|| term.to_string())
    }

    /// Swap in a new set of groups
    pub fn replace_groups(&self, groups: Vec<Vec<String>>) {
        let rebuilt = IndexState::build(groups);
        *self.state.write().unwrap_or_else(|p| p.into_inner()) = rebuilt;
    }

    /// Rebuild from `source`. The old index stays live until the new one
    /// is complete; on error it is left untouched.
    pub async fn reload(&self, source: &dyn SynonymSource) -> Result<usize> {
        let groups = source.load_groups().await?;
        let rebuilt = IndexState::build(groups);
        let count = rebuilt.groups.len();
        *self.state.write().unwrap_or_else(|p| p.into_inner()) = rebuilt;

        info!(groups = count, "synonym index reloaded");
        Ok(count)
    }

    pub fn group_count(&self) -> usize {
        self.state().groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StaticSynonymSource;

    fn groups() -> Vec<Vec<String>> {
        vec![
            vec!["臺北市政府工務局".into(), "工務局".into(), "北市工務局".into()],
            vec!["派工單".into(), "派工".into(), "工單".into()],
        ]
    }

    #[test]
    fn test_find_synonyms_is_symmetric() {
        let index = SynonymIndex::new(groups());

        let from_abbrev = index.find_synonyms("工務局");
        let from_full = index.find_synonyms("臺北市政府工務局");
        assert_eq!(from_abbrev, from_full);
        assert_eq!(from_abbrev.len(), 3);
    }

    #[test]
    fn test_unknown_term() {
        let index = SynonymIndex::new(groups());
        assert!(index.find_synonyms("環保局").is_empty());
        assert!(index.canonical_form("環保局").is_none());
        assert_eq!(index.display_form("環保局"), "環保局");
    }

    #[test]
    fn test_canonical_form_is_first_entry() {
        let index = SynonymIndex::new(groups());
        assert_eq!(index.canonical_form("工單").as_deref(), Some("派工單"));
        assert_eq!(index.display_form("北市工務局"), "臺北市政府工務局");
    }

    #[test]
    fn test_duplicates_and_blanks_dropped() {
        let index = SynonymIndex::new(vec![vec![
            "Road".into(),
            " road ".into(),
            "".into(),
            "Street".into(),
        ]]);
        assert_eq!(index.find_synonyms("ROAD"), vec!["Road".to_string(), "Street".to_string()]);
    }

    #[test]
    fn test_term_in_two_groups() {
        let index = SynonymIndex::new(vec![
            vec!["a1".into(), "shared".into()],
            vec!["b1".into(), "shared".into()],
        ]);
        let found = index.find_synonyms("shared");
        assert_eq!(found, vec!["a1".to_string(), "shared".to_string(), "b1".to_string()]);
    }

    #[tokio::test]
    async fn test_reload_replaces_index() {
        let source = StaticSynonymSource::new(groups());
        let index = SynonymIndex::empty();
        assert_eq!(index.reload(&source).await.unwrap(), 2);
        assert_eq!(index.find_synonyms("派工").len(), 3);

        source.set_groups(vec![vec!["派工".into(), "維修派工".into()]]);
        index.reload(&source).await.unwrap();
        assert_eq!(index.group_count(), 1);
        assert_eq!(index.canonical_form("維修派工").as_deref(), Some("派工"));
        assert!(index.find_synonyms("工務局").is_empty());
    }
}
