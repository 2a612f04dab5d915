//! Tool execution types
//!
//! `ToolCall` is what the planner emits (free-form name + JSON arguments).
//! Before anything runs it is parsed into a `ToolRequest`, a closed enum
//! with one typed argument struct per tool, so routing is an exhaustive
//! match rather than string dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{AgentError, Result};
use crate::expansion::QueryExpander;
use crate::rag::retrieval::{RetrievalEngine, RetrievedDocument, SearchStrategy};
use crate::store::{
    parse_date, DocumentStore, Entity, EntityDetail, KnowledgeGraph, RecordKind, Statistics,
    StatisticsQuery,
};
use crate::types::SourceRef;

/// The fixed tool catalogue. Names are part of the planner prompt contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SearchDocuments,
    SearchDispatchOrders,
    SearchEntities,
    GetEntityDetail,
    FindSimilar,
    GetStatistics,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::SearchDocuments,
        ToolName::SearchDispatchOrders,
        ToolName::SearchEntities,
        ToolName::GetEntityDetail,
        ToolName::FindSimilar,
        ToolName::GetStatistics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchDocuments => "search_documents",
            ToolName::SearchDispatchOrders => "search_dispatch_orders",
            ToolName::SearchEntities => "search_entities",
            ToolName::GetEntityDetail => "get_entity_detail",
            ToolName::FindSimilar => "find_similar",
            ToolName::GetStatistics => "get_statistics",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name.trim())
    }

    pub fn is_entity_tool(&self) -> bool {
        matches!(self, ToolName::SearchEntities | ToolName::GetEntityDetail)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned invocation, exactly as the planner produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Build a call; non-object `arguments` are replaced by an empty map
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments: match arguments {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    pub fn tool_name(&self) -> Option<ToolName> {
        ToolName::parse(&self.name)
    }

    pub fn is(&self, tool: ToolName) -> bool {
        self.tool_name() == Some(tool)
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn has_arg(&self, key: &str) -> bool {
        self.arguments.get(key).is_some_and(|v| !v.is_null())
    }
}

fn deserialize_args<T: for<'de> Deserialize<'de>>(tool: ToolName, call: &ToolCall) -> Result<T> {
    serde_json::from_value(Value::Object(call.arguments.clone())).map_err(|e| {
        AgentError::InvalidArguments {
            tool: tool.as_str().to_string(),
            reason: e.to_string(),
        }
    })
}

/// Parse an optional `YYYY-MM-DD` argument
pub fn date_arg(tool: ToolName, key: &str, value: Option<&str>) -> Result<Option<chrono::NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_date(raw).map(Some).ok_or_else(|| AgentError::InvalidArguments {
            tool: tool.as_str().to_string(),
            reason: format!("{} is not a date: {}", key, raw),
        }),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchDocumentsArgs {
    #[serde(default, alias = "keyword", alias = "q")]
    pub query: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub strategy: Option<SearchStrategy>,
    #[serde(default)]
    pub expand: Option<bool>,
    #[serde(default)]
    pub llm_rerank: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchDispatchArgs {
    #[serde(default, alias = "keyword")]
    pub query: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchEntitiesArgs {
    #[serde(alias = "query")]
    pub name: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub expand: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GetEntityDetailArgs {
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FindSimilarArgs {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default, alias = "query")]
    pub text: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GetStatisticsArgs {
    #[serde(default)]
    pub record_kind: Option<RecordKind>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
}

/// Validated, typed form of a `ToolCall`
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    SearchDocuments(SearchDocumentsArgs),
    SearchDispatchOrders(SearchDispatchArgs),
    SearchEntities(SearchEntitiesArgs),
    GetEntityDetail(GetEntityDetailArgs),
    FindSimilar(FindSimilarArgs),
    GetStatistics(GetStatisticsArgs),
}

impl ToolRequest {
    /// Reject unknown names and malformed arguments before any query runs
    pub fn parse(call: &ToolCall) -> Result<Self> {
        let tool = call
            .tool_name()
            .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;

        let request = match tool {
            ToolName::SearchDocuments => {
                let args: SearchDocumentsArgs = deserialize_args(tool, call)?;
                if args.query.trim().is_empty() && args.keywords.is_empty() {
                    return Err(AgentError::InvalidArguments {
                        tool: tool.as_str().to_string(),
                        reason: "query or keywords is required".to_string(),
                    });
                }
                ToolRequest::SearchDocuments(args)
            }
            ToolName::SearchDispatchOrders => ToolRequest::SearchDispatchOrders(deserialize_args(tool, call)?),
            ToolName::SearchEntities => ToolRequest::SearchEntities(deserialize_args(tool, call)?),
            ToolName::GetEntityDetail => {
                let args: GetEntityDetailArgs = deserialize_args(tool, call)?;
                if args.entity_id.is_none() && args.name.is_none() {
                    return Err(AgentError::InvalidArguments {
                        tool: tool.as_str().to_string(),
                        reason: "entity_id or name is required".to_string(),
                    });
                }
                ToolRequest::GetEntityDetail(args)
            }
            ToolName::FindSimilar => {
                let args: FindSimilarArgs = deserialize_args(tool, call)?;
                if args.document_id.is_none() && args.text.is_none() {
                    return Err(AgentError::InvalidArguments {
                        tool: tool.as_str().to_string(),
                        reason: "document_id or text is required".to_string(),
                    });
                }
                ToolRequest::FindSimilar(args)
            }
            ToolName::GetStatistics => ToolRequest::GetStatistics(deserialize_args(tool, call)?),
        };
        Ok(request)
    }

    pub fn tool_name(&self) -> ToolName {
        match self {
            ToolRequest::SearchDocuments(_) => ToolName::SearchDocuments,
            ToolRequest::SearchDispatchOrders(_) => ToolName::SearchDispatchOrders,
            ToolRequest::SearchEntities(_) => ToolName::SearchEntities,
            ToolRequest::GetEntityDetail(_) => ToolName::GetEntityDetail,
            ToolRequest::FindSimilar(_) => ToolName::FindSimilar,
            ToolRequest::GetStatistics(_) => ToolName::GetStatistics,
        }
    }
}

/// Data returned by a successful tool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutput {
    Documents {
        documents: Vec<RetrievedDocument>,
    },
    Entities {
        entities: Vec<Entity>,
    },
    EntityDetail {
        detail: EntityDetail,
        documents: Vec<RetrievedDocument>,
    },
    Statistics {
        query: StatisticsQuery,
        stats: Statistics,
    },
}

impl ToolOutput {
    pub fn is_empty(&self) -> bool {
        match self {
            ToolOutput::Documents { documents } => documents.is_empty(),
            ToolOutput::Entities { entities } => entities.is_empty(),
            ToolOutput::EntityDetail { .. } => false,
            ToolOutput::Statistics { stats, .. } => stats.total == 0,
        }
    }

    pub fn documents(&self) -> &[RetrievedDocument] {
        match self {
            ToolOutput::Documents { documents } | ToolOutput::EntityDetail { documents, .. } => documents,
            _ => &[],
        }
    }

    /// Aggregates and entity details answer questions without ranked documents
    pub fn is_direct_answer(&self) -> bool {
        matches!(self, ToolOutput::EntityDetail { .. } | ToolOutput::Statistics { .. })
    }

    pub fn source_refs(&self) -> Vec<SourceRef> {
        self.documents().iter().map(RetrievedDocument::source_ref).collect()
    }

    /// One-paragraph plain-text digest used in the synthesis prompt
    pub fn summary(&self) -> String {
        match self {
            ToolOutput::Documents { documents } => format!("找到 {} 筆資料", documents.len()),
            ToolOutput::Entities { entities } => {
                if entities.is_empty() {
                    return "查無相符的實體".to_string();
                }
                let names: Vec<String> = entities
                    .iter()
                    .map(|e| {
                        if e.entity_type.is_empty() {
                            format!("{} [{}]", e.canonical_name, e.id)
                        } else {
                            format!("{}（{}）[{}]", e.canonical_name, e.entity_type, e.id)
                        }
                    })
                    .collect();
                format!("相符實體：{}", names.join("、"))
            }
            ToolOutput::EntityDetail { detail, documents } => {
                let mut lines = vec![format!("實體：{}", detail.entity.canonical_name)];
                if !detail.aliases.is_empty() {
                    lines.push(format!("別名：{}", detail.aliases.join("、")));
                }
                for relation in &detail.relations {
                    lines.push(format!(
                        "關係：{} -[{}]-> {}",
                        relation.source_id, relation.relation, relation.target_id
                    ));
                }
                lines.push(format!("相關文件 {} 筆", documents.len()));
                lines.join("\n")
            }
            ToolOutput::Statistics { stats, .. } => {
                let mut text = format!("總數：{}", stats.total);
                if !stats.groups.is_empty() {
                    let groups: Vec<String> = stats
                        .groups
                        .iter()
                        .map(|(k, v)| format!("{} {}", k, v))
                        .collect();
                    text.push_str(&format!("；分組：{}", groups.join("、")));
                }
                text
            }
        }
    }
}

/// Outcome of one tool call. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool_call: ToolCall,
    pub success: bool,
    pub data: Option<ToolOutput>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ToolResult {
    pub fn success(tool_call: ToolCall, data: ToolOutput, elapsed: Duration) -> Self {
        Self {
            tool_call,
            success: true,
            data: Some(data),
            error: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failure(tool_call: ToolCall, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            tool_call,
            success: false,
            data: None,
            error: Some(error.into()),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Successful and carrying at least one record or count
    pub fn has_data(&self) -> bool {
        self.success && self.data.as_ref().is_some_and(|d| !d.is_empty())
    }

    pub fn documents(&self) -> &[RetrievedDocument] {
        match (&self.success, &self.data) {
            (true, Some(data)) => data.documents(),
            _ => &[],
        }
    }
}

/// Everything the tool implementations read from
#[derive(Clone)]
pub struct ToolContext {
    pub engine: Arc<RetrievalEngine>,
    pub store: Arc<dyn DocumentStore>,
    pub graph: Arc<dyn KnowledgeGraph>,
    pub expander: Arc<QueryExpander>,
    /// Result count when a call gives no `limit`
    pub default_limit: usize,
    /// Use the LLM relevance signal unless a call says otherwise
    pub llm_rerank: bool,
}

/// Hard ceiling on any `limit` argument
pub const MAX_RESULT_LIMIT: usize = 50;

impl ToolContext {
    pub fn limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, MAX_RESULT_LIMIT)
    }
}
