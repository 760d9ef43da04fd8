//! Console and network monitoring tools

use super::{parse_input, Tool, ToolContext, ToolOutput};
use crate::capture::CaptureConfigUpdate;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

// ============================================================================
// open_browser
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OpenBrowserInput {
    url: String,
    #[serde(default)]
    headless: bool,
}

pub struct OpenBrowserTool;

#[async_trait]
impl Tool for OpenBrowserTool {
    fn name(&self) -> &'static str {
        "open_browser"
    }

    fn description(&self) -> String {
        "Open a URL in the browser and start monitoring console logs and network requests. \
         Any previously opened page is closed and its captured data discarded."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to open"
                },
                "headless": {
                    "type": "boolean",
                    "description": "Run the browser without a window (default: false, only applies when the browser is first launched)"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: OpenBrowserInput = match parse_input(input) {
            Ok(i) => i,
            Err(output) => return output,
        };

        tokio::select! {
            result = ctx.session().open_url(&input.url, input.headless) => match result {
                Ok(message) => ToolOutput::success(message),
                Err(e) => ToolOutput::error(format!("Failed to open {}: {e}", input.url)),
            },
            () = ctx.cancel.cancelled() => ToolOutput::error("Cancelled: server is shutting down"),
        }
    }
}

// ============================================================================
// get_console_logs / get_network_requests
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LastNInput {
    last_n: usize,
}

fn last_n_schema(what: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "last_n": {
                "type": "integer",
                "minimum": 0,
                "description": format!("Number of {what} to return, most recent first picked. Use a large number to get everything.")
            }
        },
        "required": ["last_n"],
        "additionalProperties": false
    })
}

pub struct GetConsoleLogsTool;

#[async_trait]
impl Tool for GetConsoleLogsTool {
    fn name(&self) -> &'static str {
        "get_console_logs"
    }

    fn description(&self) -> String {
        "Get console logs from the monitored page, oldest first. Consecutive repeats \
         of the same message are collapsed into one entry with a repeat count."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        last_n_schema("log groups")
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: LastNInput = match parse_input(input) {
            Ok(i) => i,
            Err(output) => return output,
        };
        ToolOutput::json(&ctx.session().get_console_logs(input.last_n).await)
    }
}

pub struct GetNetworkRequestsTool;

#[async_trait]
impl Tool for GetNetworkRequestsTool {
    fn name(&self) -> &'static str {
        "get_network_requests"
    }

    fn description(&self) -> String {
        "Get captured network requests from the monitored page, oldest first, with \
         headers, post data and, once received, the response. JSON response bodies \
         are included."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        last_n_schema("requests")
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: LastNInput = match parse_input(input) {
            Ok(i) => i,
            Err(output) => return output,
        };
        ToolOutput::json(&ctx.session().get_network_requests(input.last_n).await)
    }
}

// ============================================================================
// close_browser
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoInput {}

fn no_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

pub struct CloseBrowserTool;

#[async_trait]
impl Tool for CloseBrowserTool {
    fn name(&self) -> &'static str {
        "close_browser"
    }

    fn description(&self) -> String {
        "Close the browser and discard everything captured.".to_string()
    }

    fn input_schema(&self) -> Value {
        no_input_schema()
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        if let Err(output) = parse_input::<NoInput>(input) {
            return output;
        }
        match ctx.session().close().await {
            Ok(()) => ToolOutput::success("Browser closed successfully."),
            Err(e) => ToolOutput::error(format!("Failed to close browser: {e}")),
        }
    }
}

// ============================================================================
// configure_network_capture / get_network_capture_config
// ============================================================================

pub struct ConfigureNetworkCaptureTool;

#[async_trait]
impl Tool for ConfigureNetworkCaptureTool {
    fn name(&self) -> &'static str {
        "configure_network_capture"
    }

    fn description(&self) -> String {
        "Configure which network requests are captured. Only the given fields change; \
         the full updated configuration is returned. Patterns are regular expressions \
         searched anywhere in the URL."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        let strings = |description: &str| {
            json!({
                "type": "array",
                "items": {"type": "string"},
                "description": description
            })
        };
        json!({
            "type": "object",
            "properties": {
                "enabled": {
                    "type": "boolean",
                    "description": "Capture network requests at all"
                },
                "include_patterns": strings("Only capture URLs matching one of these patterns"),
                "exclude_patterns": strings("Never capture URLs matching any of these patterns"),
                "include_types": strings("Only capture these resource types (document, xhr, fetch, script, ...)"),
                "exclude_types": strings("Never capture these resource types"),
                "capture_post_data": {
                    "type": "boolean",
                    "description": "Record request bodies"
                },
                "capture_response_body": {
                    "type": "boolean",
                    "description": "Record JSON response bodies"
                }
            },
            "additionalProperties": false
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let update: CaptureConfigUpdate = match parse_input(input) {
            Ok(u) => u,
            Err(output) => return output,
        };
        ToolOutput::json(&ctx.session().configure_capture(update))
    }
}

pub struct GetNetworkCaptureConfigTool;

#[async_trait]
impl Tool for GetNetworkCaptureConfigTool {
    fn name(&self) -> &'static str {
        "get_network_capture_config"
    }

    fn description(&self) -> String {
        "Get the current network capture configuration.".to_string()
    }

    fn input_schema(&self) -> Value {
        no_input_schema()
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        if let Err(output) = parse_input::<NoInput>(input) {
            return output;
        }
        ToolOutput::json(&ctx.session().capture_config())
    }
}
