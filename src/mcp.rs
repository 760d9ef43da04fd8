//! Model Context Protocol server
//!
//! JSON-RPC 2.0 over either stdio or HTTP. Only the tools capability is
//! offered; every tool call is forwarded to the [`ToolRegistry`].

pub mod http;
pub mod transport;

use crate::browser::MonitorSession;
use crate::tools::{ToolContext, ToolDefinition, ToolOutput, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Unknown MCP method: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl McpError {
    fn code(&self) -> i32 {
        match self {
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::Io(_) | McpError::Encode(_) => -32603,
        }
    }
}

// ─── Protocol types ─────────────────────────────────────────────────

/// JSON-RPC 2.0 request; a missing id makes it a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(default, rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolResultContent {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolResultContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
    #[serde(
        default,
        rename = "structuredContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
}

impl From<ToolOutput> for ToolCallResult {
    fn from(output: ToolOutput) -> Self {
        // Structured content must be an object
        let structured_content = output.display_data.map(|data| match data {
            Value::Object(_) => data,
            other => json!({ "result": other }),
        });
        Self {
            content: vec![ToolResultContent::Text {
                text: output.output,
            }],
            is_error: !output.success,
            structured_content,
        }
    }
}

// ─── Server ─────────────────────────────────────────────────────────

pub struct McpServer {
    registry: ToolRegistry,
    session: Arc<MonitorSession>,
    cancel: CancellationToken,
    server_info: ServerInfo,
}

impl McpServer {
    pub fn new(registry: ToolRegistry, session: Arc<MonitorSession>, cancel: CancellationToken) -> Self {
        Self {
            registry,
            session,
            cancel,
            server_info: ServerInfo {
                name: "browser-monitor".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn session(&self) -> &MonitorSession {
        &self.session
    }

    /// Handle one raw message; `None` when no reply is due.
    pub async fn handle_message(&self, raw: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(raw) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable JSON-RPC message");
                Some(JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}")))
            }
        }
    }

    /// Handle a JSON-RPC request; notifications get no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.id.is_none() || request.method.starts_with("notifications/") {
            tracing::debug!(method = %request.method, "Notification");
            return None;
        }

        let result = match request.method.as_str() {
            "initialize" => Ok(self.handle_initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(request.params).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => {
                tracing::debug!(method = %request.method, error = %e, "Request failed");
                JsonRpcResponse::error(request.id, e.code(), e.to_string())
            }
        })
    }

    fn handle_initialize(&self) -> Value {
        let capabilities = ServerCapabilities {
            tools: ToolsCapability {
                list_changed: false,
            },
        };
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": capabilities,
            "serverInfo": self.server_info,
        })
    }

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<ToolDefinition> = self.registry.definitions();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, McpError> {
        let params: ToolCallParams =
            serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))?;

        let ctx = ToolContext::new(self.cancel.clone(), Arc::clone(&self.session));
        let output = self
            .registry
            .execute(&params.name, params.arguments, ctx)
            .await
            .ok_or_else(|| McpError::InvalidParams(format!("Unknown tool: {}", params.name)))?;

        Ok(serde_json::to_value(ToolCallResult::from(output))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeEngine;
    use crate::browser::SessionSettings;
    use std::time::Duration;

    pub(crate) fn test_server() -> (McpServer, FakeEngine) {
        let engine = FakeEngine::new();
        let session = MonitorSession::new(
            Arc::new(engine.clone()),
            SessionSettings {
                idle_window: Duration::from_millis(10),
                ..SessionSettings::default()
            },
        );
        let server = McpServer::new(ToolRegistry::standard(), Arc::new(session), CancellationToken::new());
        (server, engine)
    }

    async fn call(server: &McpServer, method: &str, params: Value) -> JsonRpcResponse {
        server
            .handle_request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id: Some(json!(1)),
                method: method.to_string(),
                params,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let (server, _engine) = test_server();
        let response = call(&server, "initialize", json!({"protocolVersion": PROTOCOL_VERSION})).await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(result["serverInfo"]["name"], json!("browser-monitor"));
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let (server, _engine) = test_server();
        let reply = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let (server, _engine) = test_server();
        let reply = server.handle_message("{not json").await.unwrap();
        assert_eq!(reply.error.unwrap().code, PARSE_ERROR);
        assert!(reply.id.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (server, _engine) = test_server();
        let response = call(&server, "resources/list", json!({})).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_list_has_six_tools() {
        let (server, _engine) = test_server();
        let response = call(&server, "tools/list", Value::Null).await;
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 6);
        assert!(tools.iter().all(|t| t["inputSchema"].is_object()));
    }

    #[tokio::test]
    async fn test_tools_call_wraps_sequences() {
        let (server, _engine) = test_server();
        let response = call(
            &server,
            "tools/call",
            json!({"name": "get_console_logs", "arguments": {"last_n": 10}}),
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["content"][0]["type"], json!("text"));
        assert_eq!(result["content"][0]["text"], json!("[]"));
        assert_eq!(result["structuredContent"], json!({"result": []}));
    }

    #[tokio::test]
    async fn test_tools_call_objects_unwrapped() {
        let (server, _engine) = test_server();
        let response = call(&server, "tools/call", json!({"name": "get_network_capture_config"})).await;
        let result = response.result.unwrap();
        assert_eq!(result["structuredContent"]["enabled"], json!(true));
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_result() {
        let (server, engine) = test_server();
        engine.fail_launch();
        let response = call(
            &server,
            "tools/call",
            json!({"name": "open_browser", "arguments": {"url": "https://a.test/"}}),
        )
        .await;
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(result.get("structuredContent").is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let (server, _engine) = test_server();
        let response = call(&server, "tools/call", json!({"name": "take_screenshot"})).await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tools_call_without_name_is_invalid_params() {
        let (server, _engine) = test_server();
        let response = call(&server, "tools/call", json!({"arguments": {}})).await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }
}
