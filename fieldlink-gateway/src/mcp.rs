//! MCP (Model Context Protocol) handler
//!
//! JSON-RPC style tool surface so workflow agents can query the knowledge
//! store and the control history.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fieldlink_knowledge::{KnowledgeEngine, KnowledgeError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::control_log::ControlLog;

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const TOOL_FAILED: i32 = -32000;

mod sealed {
    pub trait Sealed {}
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidParams(String),
    #[error("{0}")]
    Failed(String),
}

impl From<KnowledgeError> for ToolError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::MissingField(field) => {
                Self::InvalidParams(format!("Missing '{}' parameter", field))
            }
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Trait for MCP tools - sealed to the tools defined here
#[async_trait]
pub trait Tool: sealed::Sealed + Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema for input parameters
    fn input_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> Result<Value, ToolError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl McpRequest {
    /// Requests without an id, and `notifications/*` methods, expect no reply.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || self.method.starts_with("notifications/")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
}

impl McpResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
            }),
        }
    }
}

fn optional_usize(params: &Value, key: &str) -> Result<Option<usize>, ToolError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| ToolError::InvalidParams(format!("'{}' must be a non-negative integer", key))),
    }
}

struct SearchKnowledgeTool {
    knowledge: Arc<KnowledgeEngine>,
}

impl sealed::Sealed for SearchKnowledgeTool {}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &'static str {
        "search_knowledge"
    }

    fn description(&self) -> &'static str {
        "Searches the crop knowledge base for passages similar to the query. Returns text, metadata and similarity for each hit."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search text"},
                "top_k": {"type": "integer", "description": "Number of results (default: 3)", "default": 3}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, ToolError> {
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidParams("Missing 'query' parameter".to_string()))?;
        let top_k = optional_usize(&params, "top_k")?;

        let hits = self.knowledge.search(query, top_k).await?;
        Ok(json!({ "count": hits.len(), "data": hits }))
    }
}

struct HistoryTool {
    control_log: Arc<ControlLog>,
}

impl sealed::Sealed for HistoryTool {}

#[async_trait]
impl Tool for HistoryTool {
    fn name(&self) -> &'static str {
        "get_history"
    }

    fn description(&self) -> &'static str {
        "Returns recent sensor readings, oldest first."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "description": "Maximum number of readings"}
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, ToolError> {
        let limit = optional_usize(&params, "limit")?;
        let data = self.control_log.sensor_history(limit).await;
        Ok(json!({ "count": data.len(), "data": data }))
    }
}

struct ControlLogTool {
    control_log: Arc<ControlLog>,
}

impl sealed::Sealed for ControlLogTool {}

#[async_trait]
impl Tool for ControlLogTool {
    fn name(&self) -> &'static str {
        "get_control_log"
    }

    fn description(&self) -> &'static str {
        "Returns recent sensor readings paired with the control commands issued for them."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "description": "Maximum number of entries"}
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, ToolError> {
        let limit = optional_usize(&params, "limit")?;
        let data = self.control_log.entries(limit).await;
        Ok(json!({ "count": data.len(), "data": data }))
    }
}

pub struct McpHandler {
    tools: BTreeMap<&'static str, Box<dyn Tool>>,
}

impl McpHandler {
    pub fn new(knowledge: Arc<KnowledgeEngine>, control_log: Arc<ControlLog>) -> Self {
        let registered: Vec<Box<dyn Tool>> = vec![
            Box::new(SearchKnowledgeTool { knowledge }),
            Box::new(HistoryTool {
                control_log: Arc::clone(&control_log),
            }),
            Box::new(ControlLogTool { control_log }),
        ];

        Self {
            tools: registered.into_iter().map(|tool| (tool.name(), tool)).collect(),
        }
    }

    pub async fn handle(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            "initialize" => McpResponse::success(
                request.id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "serverInfo": {
                        "name": "fieldlink",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": { "tools": {} }
                }),
            ),
            "ping" => McpResponse::success(request.id, json!({})),
            "tools/list" => self.list_tools(request.id),
            "tools/call" => self.call_tool(request.id, request.params).await,
            _ => McpResponse::error(request.id, METHOD_NOT_FOUND, "Method not found"),
        }
    }

    fn list_tools(&self, id: Option<Value>) -> McpResponse {
        let tools: Vec<Value> = self
            .tools
            .values()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema()
                })
            })
            .collect();

        McpResponse::success(id, json!({ "tools": tools }))
    }

    async fn call_tool(&self, id: Option<Value>, params: Value) -> McpResponse {
        let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
            return McpResponse::error(id, INVALID_PARAMS, "Missing tool name");
        };
        let Some(tool) = self.tools.get(tool_name) else {
            return McpResponse::error(id, INVALID_PARAMS, format!("Unknown tool: {}", tool_name));
        };

        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match tool.execute(arguments).await {
            Ok(result) => McpResponse::success(
                id,
                json!({
                    "content": [{
                        "type": "text",
                        "text": serde_json::to_string_pretty(&result).unwrap_or_default()
                    }]
                }),
            ),
            Err(ToolError::InvalidParams(message)) => {
                McpResponse::error(id, INVALID_PARAMS, message)
            }
            Err(ToolError::Failed(message)) => {
                tracing::warn!(tool = tool_name, "MCP tool failed: {}", message);
                McpResponse::error(id, TOOL_FAILED, message)
            }
        }
    }

    /// Parse and handle a raw JSON-RPC body. Notifications get no response.
    pub async fn handle_json(&self, body: &str) -> Option<McpResponse> {
        match serde_json::from_str::<McpRequest>(body) {
            Ok(request) if request.is_notification() => {
                tracing::debug!(method = %request.method, "MCP notification received");
                None
            }
            Ok(request) => Some(self.handle(request).await),
            Err(e) => Some(McpResponse::error(
                None,
                PARSE_ERROR,
                format!("Parse error: {}", e),
            )),
        }
    }
}
