//! In-memory store implementations
//!
//! Backed by a JSON corpus file; used by the CLI and the test suite.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

use crate::embedding::{cosine_similarity, EmbeddingCache};
use crate::errors::{AgentError, Result};
use crate::store::{
    AliasRecord, DispatchFilter, DocumentFilter, DocumentRecord, DocumentStore, Entity,
    EntityDetail, KnowledgeGraph, RecordKind, Relation, Statistics, StatisticsQuery, SynonymSource,
    FIELD_ASSIGNEE, FIELD_STATUS,
};

/// Group label for records lacking the grouped field
const UNKNOWN_GROUP: &str = "未知";

/// Document plus its (optional) precomputed embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(flatten)]
    pub record: DocumentRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl From<DocumentRecord> for StoredDocument {
    fn from(record: DocumentRecord) -> Self {
        Self {
            record,
            embedding: None,
        }
    }
}

/// Link between an entity and a document that mentions it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDocument {
    pub entity_id: String,
    pub document_id: String,
}

/// Everything the in-memory stores are loaded from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub documents: Vec<StoredDocument>,
    #[serde(default)]
    pub dispatch_orders: Vec<DocumentRecord>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub aliases: Vec<AliasRecord>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub entity_documents: Vec<EntityDocument>,
    #[serde(default)]
    pub synonyms: Vec<Vec<String>>,
}

impl Corpus {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a corpus file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus {}", path.display()))?;
        let corpus: Corpus = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse corpus {}", path.display()))?;

        info!(
            documents = corpus.documents.len(),
            dispatch_orders = corpus.dispatch_orders.len(),
            entities = corpus.entities.len(),
            "corpus loaded"
        );
        Ok(corpus)
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Number of keywords present in the record text
fn keyword_hits(record: &DocumentRecord, keywords: &[String]) -> usize {
    let text = record.text().to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.trim().is_empty() && text.contains(&k.to_lowercase()))
        .count()
}

fn in_range(
    record: &DocumentRecord,
    from: Option<chrono::NaiveDate>,
    to: Option<chrono::NaiveDate>,
) -> bool {
    if from.is_none() && to.is_none() {
        return true;
    }
    let Some(date) = record.date() else {
        return false;
    };
    from.map_or(true, |f| date >= f) && to.map_or(true, |t| date <= t)
}

/// Newest first, undated last
fn by_date_desc(a: &DocumentRecord, b: &DocumentRecord) -> std::cmp::Ordering {
    b.date().cmp(&a.date())
}

/// Document store over a fixed set of records
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: Vec<StoredDocument>,
    dispatch_orders: Vec<DocumentRecord>,
}

impl InMemoryDocumentStore {
    pub fn new(documents: Vec<StoredDocument>, dispatch_orders: Vec<DocumentRecord>) -> Self {
        Self {
            documents,
            dispatch_orders,
        }
    }

    pub fn from_corpus(corpus: &Corpus) -> Self {
        Self::new(corpus.documents.clone(), corpus.dispatch_orders.clone())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Embed every document that has no vector yet. Returns how many were filled.
    pub async fn index_embeddings(&mut self, cache: &EmbeddingCache) -> Result<usize> {
        let missing: Vec<usize> = self
            .documents
            .iter()
            .enumerate()
            .filter(|(_, d)| d.embedding.is_none())
            .map(|(i, _)| i)
            .collect();

        if missing.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = missing
            .iter()
            .map(|&i| self.documents[i].record.text())
            .collect();
        let vectors = cache.get_batch(&texts).await?;

        let mut filled = 0;
        for (idx, vector) in missing.into_iter().zip(vectors) {
            if vector.is_some() {
                filled += 1;
            }
            self.documents[idx].embedding = vector;
        }

        debug!(filled, "document embeddings indexed");
        Ok(filled)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn keyword_search(&self, filter: &DocumentFilter, limit: usize) -> Result<Vec<DocumentRecord>> {
        let mut hits: Vec<(usize, &DocumentRecord)> = self
            .documents
            .iter()
            .map(|d| &d.record)
            .filter(|r| filter.matches_structure(r))
            .map(|r| (keyword_hits(r, &filter.keywords), r))
            .filter(|(n, _)| filter.keywords.is_empty() || *n > 0)
            .collect();

        hits.sort_by(|(na, a), (nb, b)| nb.cmp(na).then_with(|| by_date_desc(a, b)));

        Ok(hits.into_iter().take(limit).map(|(_, r)| r.clone()).collect())
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        filter: &DocumentFilter,
        limit: usize,
    ) -> Result<Vec<(DocumentRecord, f32)>> {
        let mut scored: Vec<(DocumentRecord, f32)> = self
            .documents
            .iter()
            .filter(|d| filter.matches_structure(&d.record))
            .filter_map(|d| {
                d.embedding
                    .as_ref()
                    .map(|v| (d.record.clone(), cosine_similarity(embedding, v)))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self
            .documents
            .iter()
            .find(|d| d.record.id == id)
            .map(|d| d.record.clone()))
    }

    async fn search_dispatch_orders(&self, filter: &DispatchFilter, limit: usize) -> Result<Vec<DocumentRecord>> {
        let mut hits: Vec<&DocumentRecord> = self
            .dispatch_orders
            .iter()
            .filter(|r| filter.keywords.is_empty() || keyword_hits(r, &filter.keywords) > 0)
            .filter(|r| {
                filter
                    .status
                    .as_ref()
                    .map_or(true, |s| r.field(FIELD_STATUS) == Some(s.as_str()))
            })
            .filter(|r| {
                filter.assignee.as_ref().map_or(true, |a| {
                    r.field(FIELD_ASSIGNEE).is_some_and(|v| contains_ci(v, a))
                })
            })
            .filter(|r| in_range(r, filter.date_from, filter.date_to))
            .collect();

        hits.sort_by(|a, b| by_date_desc(a, b));
        Ok(hits.into_iter().take(limit).cloned().collect())
    }

    async fn statistics(&self, query: &StatisticsQuery) -> Result<Statistics> {
        let records: Vec<&DocumentRecord> = match query.record_kind {
            RecordKind::Documents => self.documents.iter().map(|d| &d.record).collect(),
            RecordKind::DispatchOrders => self.dispatch_orders.iter().collect(),
        };

        let mut stats = Statistics::default();
        for record in records
            .into_iter()
            .filter(|r| in_range(r, query.date_from, query.date_to))
        {
            stats.total += 1;
            if let Some(field) = &query.group_by {
                let key = record
                    .field(field)
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or(UNKNOWN_GROUP);
                *stats.groups.entry(key.to_string()).or_insert(0) += 1;
            }
        }
        Ok(stats)
    }
}

/// Knowledge graph over fixed entity, alias and relation tables
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeGraph {
    entities: Vec<Entity>,
    aliases: Vec<AliasRecord>,
    relations: Vec<Relation>,
    entity_documents: Vec<EntityDocument>,
}

impl InMemoryKnowledgeGraph {
    pub fn new(entities: Vec<Entity>, aliases: Vec<AliasRecord>, relations: Vec<Relation>) -> Self {
        Self {
            entities,
            aliases,
            relations,
            entity_documents: Vec::new(),
        }
    }

    pub fn with_document_links(mut self, links: Vec<EntityDocument>) -> Self {
        self.entity_documents = links;
        self
    }

    pub fn from_corpus(corpus: &Corpus) -> Self {
        Self::new(
            corpus.entities.clone(),
            corpus.aliases.clone(),
            corpus.relations.clone(),
        )
        .with_document_links(corpus.entity_documents.clone())
    }

    fn aliases_of(&self, entity_id: &str) -> impl Iterator<Item = &AliasRecord> {
        let entity_id = entity_id.to_string();
        self.aliases.iter().filter(move |a| a.entity_id == entity_id)
    }
}

#[async_trait]
impl KnowledgeGraph for InMemoryKnowledgeGraph {
    async fn aliases_named(&self, name: &str) -> Result<Vec<AliasRecord>> {
        Ok(self.aliases.iter().filter(|a| a.alias == name).cloned().collect())
    }

    async fn entities_named(&self, name: &str) -> Result<Vec<Entity>> {
        Ok(self
            .entities
            .iter()
            .filter(|e| e.canonical_name == name)
            .cloned()
            .collect())
    }

    async fn entities_by_id(&self, ids: &[String]) -> Result<Vec<Entity>> {
        Ok(self
            .entities
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect())
    }

    async fn aliases_for(&self, entity_ids: &[String]) -> Result<Vec<AliasRecord>> {
        Ok(self
            .aliases
            .iter()
            .filter(|a| entity_ids.contains(&a.entity_id))
            .cloned()
            .collect())
    }

    async fn search_entities(
        &self,
        terms: &[String],
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        let terms: Vec<&String> = terms.iter().filter(|t| !t.trim().is_empty()).collect();
        let mut seen = HashSet::new();

        let found = self
            .entities
            .iter()
            .filter(|e| entity_type.map_or(true, |t| e.entity_type == t))
            .filter(|e| {
                terms.iter().any(|t| {
                    contains_ci(&e.canonical_name, t)
                        || self.aliases_of(&e.id).any(|a| contains_ci(&a.alias, t))
                })
            })
            .filter(|e| seen.insert(e.id.clone()))
            .take(limit)
            .cloned()
            .collect();
        Ok(found)
    }

    async fn entity_detail(&self, entity_id: &str) -> Result<Option<EntityDetail>> {
        let Some(entity) = self.entities.iter().find(|e| e.id == entity_id) else {
            return Ok(None);
        };

        Ok(Some(EntityDetail {
            entity: entity.clone(),
            aliases: self.aliases_of(entity_id).map(|a| a.alias.clone()).collect(),
            relations: self
                .relations
                .iter()
                .filter(|r| r.source_id == entity_id || r.target_id == entity_id)
                .cloned()
                .collect(),
            document_ids: self
                .entity_documents
                .iter()
                .filter(|l| l.entity_id == entity_id)
                .map(|l| l.document_id.clone())
                .collect(),
        }))
    }
}

/// Synonym groups held in memory; `set_groups` simulates a DB edit
#[derive(Debug, Default)]
pub struct StaticSynonymSource {
    groups: RwLock<Vec<Vec<String>>>,
}

impl StaticSynonymSource {
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        Self {
            groups: RwLock::new(groups),
        }
    }

    pub fn set_groups(&self, groups: Vec<Vec<String>>) {
        *self.groups.write().unwrap_or_else(|p| p.into_inner()) = groups;
    }
}

#[async_trait]
impl SynonymSource for StaticSynonymSource {
    async fn load_groups(&self) -> Result<Vec<Vec<String>>> {
        Ok(self.groups.read().unwrap_or_else(|p| p.into_inner()).clone())
    }
}

/// JSON file of synonym groups (`[["工務局", "臺北市政府工務局"], ...]`),
/// re-read on every load.
#[derive(Debug, Clone)]
pub struct FileSynonymSource {
    path: PathBuf,
}

impl FileSynonymSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SynonymSource for FileSynonymSource {
    async fn load_groups(&self) -> Result<Vec<Vec<String>>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let groups: Vec<Vec<String>> = serde_json::from_str(&contents).map_err(|e| {
            AgentError::StoreError(format!(
                "invalid synonym file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(groups)
    }
}
