//! Remotely invocable tools
//!
//! Tools are stateless singletons; everything a call needs arrives through
//! [`ToolContext`].

mod monitor;

pub use monitor::{
    CloseBrowserTool, ConfigureNetworkCaptureTool, GetConsoleLogsTool,
    GetNetworkCaptureConfigTool, GetNetworkRequestsTool, OpenBrowserTool,
};

use crate::browser::MonitorSession;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result from tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
    /// Structured form of `output`, when the tool produces JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_data: Option<Value>,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            display_data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            display_data: None,
        }
    }

    pub fn with_display(mut self, data: Value) -> Self {
        self.display_data = Some(data);
        self
    }

    /// Successful output rendered as JSON, carried both as text and as
    /// structured data.
    pub fn json(value: &impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::success(value.to_string()).with_display(value),
            Err(e) => Self::error(format!("Failed to serialize result: {e}")),
        }
    }
}

/// Tool metadata advertised to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// All context needed for a tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    /// Fires when the process is shutting down
    pub cancel: CancellationToken,

    session: Arc<MonitorSession>,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, session: Arc<MonitorSession>) -> Self {
        Self { cancel, session }
    }

    pub fn session(&self) -> &MonitorSession {
        &self.session
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description shown to clients
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput;
}

/// Parse tool arguments, treating absent arguments as an empty object.
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolOutput> {
    let input = if input.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        input
    };
    serde_json::from_value(input).map_err(|e| ToolOutput::error(format!("Invalid input: {e}")))
}

/// The set of tools exposed by the server
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn standard() -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(OpenBrowserTool),
            Arc::new(GetConsoleLogsTool),
            Arc::new(GetNetworkRequestsTool),
            Arc::new(CloseBrowserTool),
            Arc::new(ConfigureNetworkCaptureTool),
            Arc::new(GetNetworkCaptureConfigTool),
        ];
        Self { tools }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name; `None` if no tool has that name.
    pub async fn execute(&self, name: &str, input: Value, ctx: ToolContext) -> Option<ToolOutput> {
        let tool = self.tools.iter().find(|tool| tool.name() == name)?;
        tracing::info!(tool = name, "Tool call");
        let output = tool.run(input, ctx).await;
        tracing::info!(
            tool = name,
            success = output.success,
            output_len = output.output.len(),
            "Tool call finished"
        );
        Some(output)
    }
}
