//! Stored console and network entries

use super::event::{ConsoleEvent, PendingBody, RequestEvent, ResponseEvent};
use super::filter::CaptureConfig;
use super::CaptureError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Header map with lower-cased names.
pub type Headers = BTreeMap<String, String>;

/// Call site of a console message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ConsoleLocation {
    pub url: String,
    pub line_number: i64,
    pub column_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(default)]
    pub function_name: String,
    pub url: String,
    pub line_number: i64,
    pub column_number: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleLogEntry {
    pub kind: String,
    pub text: String,
    pub location: Option<ConsoleLocation>,
    pub timestamp: f64,
    pub stack_trace: Option<Vec<StackFrame>>,
    pub args: Option<Vec<String>>,
    pub page: Option<String>,
    /// Set on degraded entries only
    pub error: Option<String>,
}

impl ConsoleLogEntry {
    pub fn from_event(event: &ConsoleEvent, timestamp: f64) -> Result<Self, CaptureError> {
        let location = if event.location.is_null() {
            None
        } else {
            Some(
                ConsoleLocation::deserialize(&event.location).map_err(|source| {
                    CaptureError::Malformed {
                        field: "location",
                        source,
                    }
                })?,
            )
        };
        let stack_trace = event
            .stack_trace
            .as_ref()
            .map(Vec::<StackFrame>::deserialize)
            .transpose()
            .map_err(|source| CaptureError::Malformed {
                field: "stackTrace",
                source,
            })?;

        Ok(Self {
            kind: event.kind.clone(),
            text: event.text.clone(),
            location,
            timestamp,
            stack_trace,
            args: (!event.args.is_empty()).then(|| event.args.clone()),
            page: event.page.clone(),
            error: None,
        })
    }

    /// Minimal record kept when an event could not be converted.
    pub fn degraded(event: &ConsoleEvent, timestamp: f64, error: &CaptureError) -> Self {
        Self {
            kind: event.kind.clone(),
            text: event.text.clone(),
            location: None,
            timestamp,
            stack_trace: None,
            args: None,
            page: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkRequestEntry {
    /// Store-assigned, unique for the lifetime of the store
    pub seq: u64,
    /// Engine request identifier
    pub id: String,
    pub url: String,
    pub method: String,
    pub headers: Headers,
    pub timestamp: f64,
    pub resource_type: String,
    pub post_data: Option<String>,
    pub post_data_json: Option<Value>,
    pub response: Option<NetworkResponseEntry>,
    /// Set on degraded entries only
    pub error: Option<String>,
}

impl NetworkRequestEntry {
    pub fn from_event(
        event: &RequestEvent,
        seq: u64,
        timestamp: f64,
        config: &CaptureConfig,
    ) -> Result<Self, CaptureError> {
        let headers = parse_headers(&event.headers)?;

        let post_data = event
            .post_data
            .clone()
            .filter(|data| config.capture_post_data && !data.is_empty());
        let post_data_json = post_data
            .as_deref()
            .filter(|_| is_json_content(&headers))
            .and_then(|data| serde_json::from_str(data).ok());

        Ok(Self {
            seq,
            id: event.request_id.clone(),
            url: event.url.clone(),
            method: event.method.clone(),
            headers,
            timestamp,
            resource_type: event.resource_type.clone(),
            post_data,
            post_data_json,
            response: None,
            error: None,
        })
    }

    pub fn degraded(event: &RequestEvent, seq: u64, timestamp: f64, error: &CaptureError) -> Self {
        Self {
            seq,
            id: event.request_id.clone(),
            url: event.url.clone(),
            method: if event.method.is_empty() {
                "ERROR".to_string()
            } else {
                event.method.clone()
            },
            headers: Headers::new(),
            timestamp,
            resource_type: event.resource_type.clone(),
            post_data: None,
            post_data_json: None,
            response: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkResponseEntry {
    pub status: i64,
    pub status_text: String,
    pub headers: Headers,
    pub timestamp: f64,
    /// Unread body; taken exactly once by the snapshot pass
    pub pending_body: Option<PendingBody>,
    pub body: Option<Value>,
    pub body_text: Option<String>,
    pub body_error: Option<String>,
    /// Set on degraded entries only
    pub error: Option<String>,
}

impl NetworkResponseEntry {
    pub fn from_event(
        event: &ResponseEvent,
        timestamp: f64,
        config: &CaptureConfig,
    ) -> Result<Self, CaptureError> {
        let headers = parse_headers(&event.headers)?;

        let wants_body = config.capture_response_body
            && (is_json_content(&headers) || event.url.ends_with(".json"));
        let pending_body = event.body.clone().filter(|_| wants_body);
        if pending_body.is_some() {
            tracing::debug!(url = %event.url, "JSON response body queued for lazy read");
        }

        Ok(Self {
            status: event.status,
            status_text: event.status_text.clone(),
            headers,
            timestamp,
            pending_body,
            ..Self::default()
        })
    }

    pub fn degraded(event: &ResponseEvent, timestamp: f64, error: &CaptureError) -> Self {
        Self {
            status: event.status,
            timestamp,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Convert a raw header object into a lower-cased [`Headers`] map.
///
/// `null` is an empty map. Names that collide after lower-casing are joined
/// with `", "`.
pub fn parse_headers(raw: &Value) -> Result<Headers, CaptureError> {
    let object = match raw {
        Value::Null => return Ok(Headers::new()),
        Value::Object(object) => object,
        other => return Err(CaptureError::Headers(type_name(other).to_string())),
    };

    let mut headers = Headers::new();
    for (name, value) in object {
        let Value::String(value) = value else {
            return Err(CaptureError::Headers(format!(
                "{} for header {name:?}",
                type_name(value)
            )));
        };
        headers
            .entry(name.to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }
    Ok(headers)
}

fn is_json_content(headers: &Headers) -> bool {
    headers
        .get("content-type")
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
