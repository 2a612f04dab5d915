//! Backing stores
//!
//! Narrow async interfaces over the document store, the knowledge graph and
//! the synonym dictionary. Everything the retrieval core reads goes through
//! these traits; `memory` provides in-process implementations loaded from a
//! JSON corpus.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::Result;

pub use memory::{
    Corpus, FileSynonymSource, InMemoryDocumentStore, InMemoryKnowledgeGraph, StaticSynonymSource,
};

/// Raw field mapping of a stored record
pub type Fields = BTreeMap<String, String>;

pub const FIELD_SUBJECT: &str = "subject";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_DOC_NUMBER: &str = "doc_number";
pub const FIELD_SENDER: &str = "sender";
pub const FIELD_DATE: &str = "date";
pub const FIELD_DOC_TYPE: &str = "doc_type";
pub const FIELD_CONTENT: &str = "content";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_ASSIGNEE: &str = "assignee";

/// Parse a stored or user-supplied date (`YYYY-MM-DD` or `YYYY/MM/DD`)
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y/%m/%d"))
        .ok()
}

/// A document or dispatch-order row as the store returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Fields::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.field(FIELD_DATE).and_then(parse_date)
    }

    /// Human-readable citation label
    pub fn label(&self) -> String {
        let number = self.field(FIELD_DOC_NUMBER).unwrap_or_default();
        let title = self
            .field(FIELD_SUBJECT)
            .or_else(|| self.field(FIELD_TITLE))
            .unwrap_or_default();

        let label = format!("{} {}", number, title).trim().to_string();
        if label.is_empty() {
            self.id.clone()
        } else {
            label
        }
    }

    /// Concatenated searchable text of every field, in key order
    pub fn text(&self) -> String {
        self.fields
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Structured filter for document queries. Keywords match if any one of
/// them occurs in the record text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFilter {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub doc_type: Option<String>,
}

impl DocumentFilter {
    pub fn keywords(keywords: Vec<String>) -> Self {
        Self {
            keywords,
            ..Default::default()
        }
    }

    pub fn has_date_range(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some()
    }

    /// Whether a record passes every structured constraint except keywords
    pub fn matches_structure(&self, record: &DocumentRecord) -> bool {
        if self.has_date_range() {
            let Some(date) = record.date() else {
                return false;
            };
            if self.date_from.is_some_and(|from| date < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| date > to) {
                return false;
            }
        }

        if let Some(sender) = &self.sender {
            let matches = record
                .field(FIELD_SENDER)
                .is_some_and(|s| s.contains(sender.as_str()));
            if !matches {
                return false;
            }
        }

        if let Some(doc_type) = &self.doc_type {
            if record.field(FIELD_DOC_TYPE) != Some(doc_type.as_str()) {
                return false;
            }
        }

        true
    }
}

/// Structured filter for dispatch orders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchFilter {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
}

/// Record kind an aggregate runs over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[default]
    Documents,
    DispatchOrders,
}

/// Aggregate count request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsQuery {
    #[serde(default)]
    pub record_kind: RecordKind,
    /// Field to group by; `None` only counts
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
}

/// Aggregate counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    #[serde(default)]
    pub groups: BTreeMap<String, usize>,
}

/// Canonical knowledge-graph entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub canonical_name: String,
    #[serde(default)]
    pub entity_type: String,
}

/// Alternate name recorded for an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    pub alias: String,
    pub entity_id: String,
}

/// Directed relation between two entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source_id: String,
    pub target_id: String,
    pub relation: String,
}

/// Entity with its aliases, relations and linked document ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDetail {
    pub entity: Entity,
    pub aliases: Vec<String>,
    pub relations: Vec<Relation>,
    pub document_ids: Vec<String>,
}

/// Keyword/structured and vector-similarity queries over documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn keyword_search(&self, filter: &DocumentFilter, limit: usize) -> Result<Vec<DocumentRecord>>;

    /// Nearest neighbours by cosine similarity, best first
    async fn vector_search(
        &self,
        embedding: &[f32],
        filter: &DocumentFilter,
        limit: usize,
    ) -> Result<Vec<(DocumentRecord, f32)>>;

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>>;

    async fn search_dispatch_orders(&self, filter: &DispatchFilter, limit: usize) -> Result<Vec<DocumentRecord>>;

    async fn statistics(&self, query: &StatisticsQuery) -> Result<Statistics>;
}

/// Alias, canonical-entity and relation lookups
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// Alias rows whose alias name equals `name`
    async fn aliases_named(&self, name: &str) -> Result<Vec<AliasRecord>>;

    /// Entities whose canonical name equals `name`
    async fn entities_named(&self, name: &str) -> Result<Vec<Entity>>;

    async fn entities_by_id(&self, ids: &[String]) -> Result<Vec<Entity>>;

    /// Every alias row of the given entities
    async fn aliases_for(&self, entity_ids: &[String]) -> Result<Vec<AliasRecord>>;

    /// Entities whose canonical name or any alias contains one of `terms`
    async fn search_entities(
        &self,
        terms: &[String],
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Entity>>;

    async fn entity_detail(&self, entity_id: &str) -> Result<Option<EntityDetail>>;
}

/// Synonym dictionary provider. Reloadable at runtime.
#[async_trait]
pub trait SynonymSource: Send + Sync {
    async fn load_groups(&self) -> Result<Vec<Vec<String>>>;
}
