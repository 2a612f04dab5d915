//! Tool registry with JSON schemas
//!
//! Describes the retrieval catalogue to the planner. Order of registration
//! is the order tools appear in the prompt.
//!
//! Tools:
//! - search_documents: hybrid vector + keyword document search
//! - search_dispatch_orders: structured dispatch-order search
//! - search_entities: knowledge-graph entity lookup
//! - get_entity_detail: entity relations and linked documents
//! - find_similar: nearest-neighbour documents
//! - get_statistics: aggregate counts

use serde::Serialize;
use serde_json::{json, Value};

use crate::tools::types::ToolName;

/// Tool schema definition
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: ToolName,
    pub description: String,
    /// Parameter schema (JSON Schema)
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: ToolName, description: &str, parameters: Value) -> Self {
        Self {
            name,
            description: description.to_string(),
            parameters,
        }
    }
}

/// Tool registry
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolSchema>,
}

impl ToolRegistry {
    /// Create new tool registry with all tools
    pub fn new() -> Self {
        let mut registry = Self { tools: Vec::new() };

        registry.register_search_documents();
        registry.register_search_dispatch_orders();
        registry.register_search_entities();
        registry.register_get_entity_detail();
        registry.register_find_similar();
        registry.register_get_statistics();

        registry
    }

    fn register_search_documents(&mut self) {
        self.tools.push(ToolSchema::new(
            ToolName::SearchDocuments,
            "搜尋公文（語意 + 關鍵字混合檢索並重新排序）",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "查詢內容"},
                    "keywords": {"type": "array", "items": {"type": "string"}, "description": "關鍵字"},
                    "date_from": {"type": "string", "description": "起始日期 YYYY-MM-DD"},
                    "date_to": {"type": "string", "description": "結束日期 YYYY-MM-DD"},
                    "sender": {"type": "string", "description": "發文單位"},
                    "doc_type": {"type": "string", "description": "公文類型，例如 函、公告、簽"},
                    "limit": {"type": "integer", "description": "回傳筆數"}
                },
                "required": ["query"]
            }),
        ));
    }

    fn register_search_dispatch_orders(&mut self) {
        self.tools.push(ToolSchema::new(
            ToolName::SearchDispatchOrders,
            "搜尋派工單（依關鍵字、狀態、承辦人、日期）",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "查詢內容"},
                    "status": {"type": "string", "description": "狀態，例如 處理中、已結案"},
                    "assignee": {"type": "string", "description": "承辦人"},
                    "date_from": {"type": "string", "description": "起始日期 YYYY-MM-DD"},
                    "date_to": {"type": "string", "description": "結束日期 YYYY-MM-DD"},
                    "limit": {"type": "integer"}
                }
            }),
        ));
    }

    fn register_search_entities(&mut self) {
        self.tools.push(ToolSchema::new(
            ToolName::SearchEntities,
            "查詢機關、人員等實體（含同義詞與別名）",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "實體名稱或簡稱"},
                    "entity_type": {"type": "string", "description": "實體類型"},
                    "limit": {"type": "integer"}
                },
                "required": ["name"]
            }),
        ));
    }

    fn register_get_entity_detail(&mut self) {
        self.tools.push(ToolSchema::new(
            ToolName::GetEntityDetail,
            "取得實體的別名、關係與相關公文",
            json!({
                "type": "object",
                "properties": {
                    "entity_id": {"type": "string"},
                    "name": {"type": "string", "description": "實體名稱（未知 entity_id 時使用）"}
                }
            }),
        ));
    }

    fn register_find_similar(&mut self) {
        self.tools.push(ToolSchema::new(
            ToolName::FindSimilar,
            "找出與指定公文或文字內容相似的公文",
            json!({
                "type": "object",
                "properties": {
                    "document_id": {"type": "string"},
                    "text": {"type": "string"},
                    "limit": {"type": "integer"}
                }
            }),
        ));
    }

    fn register_get_statistics(&mut self) {
        self.tools.push(ToolSchema::new(
            ToolName::GetStatistics,
            "統計公文或派工單數量，可依欄位分組",
            json!({
                "type": "object",
                "properties": {
                    "record_kind": {"type": "string", "enum": ["documents", "dispatch_orders"]},
                    "group_by": {"type": "string", "description": "分組欄位，例如 sender、doc_type、status"},
                    "date_from": {"type": "string"},
                    "date_to": {"type": "string"}
                }
            }),
        ));
    }

    pub fn get(&self, name: ToolName) -> Option<&ToolSchema> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Whether `name` is a registered tool
    pub fn contains(&self, name: &str) -> bool {
        ToolName::parse(name).is_some_and(|t| self.get(t).is_some())
    }

    pub fn schemas(&self) -> &[ToolSchema] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Catalogue text for the planner's system prompt
    pub fn render_catalogue(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("- {}: {}\n  參數: {}", t.name, t.description, t.parameters))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
