//! Raw page events as reported by a browser engine
//!
//! These are the only shapes an engine has to produce. Fields that come
//! straight off the wire (`location`, `stack_trace`, `headers`) stay as raw
//! JSON here and are validated when the store turns them into entries.

use super::CaptureError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Monotonic clock shared by a session, in seconds since the session began.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Deferred read of a response body, resolved at snapshot time.
#[async_trait]
pub trait BodySource: Send + Sync {
    async fn text(&self) -> Result<String, CaptureError>;
}

/// Handle to a body that has not been read yet.
///
/// Cheap to clone. Not `Serialize`: it has to be resolved and
/// dropped before an entry leaves the store.
#[derive(Clone)]
pub struct PendingBody(Arc<dyn BodySource>);

impl PendingBody {
    pub fn new(source: impl BodySource + 'static) -> Self {
        Self(Arc::new(source))
    }

    pub async fn text(&self) -> Result<String, CaptureError> {
        self.0.text().await
    }
}

impl fmt::Debug for PendingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingBody")
    }
}

/// A `console.*` call made by the page.
#[derive(Debug, Clone)]
pub struct ConsoleEvent {
    /// Console method, e.g. `log`, `warning`, `error`
    pub kind: String,
    pub text: String,
    /// `{url, lineNumber, columnNumber}` of the call site
    pub location: Value,
    /// Call frames, if the engine reported any
    pub stack_trace: Option<Value>,
    /// Per-argument text renderings
    pub args: Vec<String>,
    /// URL of the page that logged the message
    pub page: Option<String>,
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    /// Engine-assigned request identifier
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub headers: Value,
    /// Lower-case resource type, e.g. `document`, `xhr`, `script`
    pub resource_type: String,
    pub post_data: Option<String>,
}

/// An incoming response.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    /// Identifier of the request this answers, when the engine knows it
    pub request_id: Option<String>,
    pub url: String,
    pub status: i64,
    pub status_text: String,
    pub headers: Value,
    /// Body reader; `None` when the response has no readable body (redirects)
    pub body: Option<PendingBody>,
}

#[derive(Debug, Clone)]
pub enum PageEvent {
    Console(ConsoleEvent),
    Request(RequestEvent),
    Response(ResponseEvent),
}

/// A page event stamped with the session clock at the moment it fired.
#[derive(Debug, Clone)]
pub struct TimedEvent {
    pub timestamp: f64,
    pub event: PageEvent,
}
