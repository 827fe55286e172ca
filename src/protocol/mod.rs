// src/protocol/mod.rs
pub mod frame;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use frame::parse_frame;

// 1. The Methods we speak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    ToolsCall,
    ToolsList,
}

impl RpcMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::ToolsCall => "tools/call",
            RpcMethod::ToolsList => "tools/list",
        }
    }
}

// 2. The Request Struct
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
    pub id: String,
}

impl JsonRpcRequest {
    pub fn new(method: RpcMethod, params: Value, id: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.as_str().to_string(),
            params,
            id: id.into(),
        }
    }
}

// 3. The Response Struct
// Servers in the wild omit `jsonrpc` and `id` often enough that both are optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl JsonRpcResponse {
    /// The correlation id as a string, whether the server sent it as a string or a number.
    pub fn id_string(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

// --- TOOL CALL TYPES ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Text of every text-bearing part, joined by newlines. `None` when no part has text.
    pub fn joined_text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// --- TOOL DISCOVERY TYPES ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

/// A tool as the RPC service describes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

/// A tool in the host's declaration dialect: `parameters` instead of `inputSchema`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}
