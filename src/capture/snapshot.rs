//! Plain, serializable views of captured network traffic

use super::entry::{Headers, NetworkRequestEntry, NetworkResponseEntry};
use super::most_recent;
use super::store::{lock_store, SharedStore};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Result of reading one pending response body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyOutcome {
    Json(Value),
    /// Not valid JSON; kept verbatim
    Text(String),
    Failed(String),
}

impl BodyOutcome {
    fn from_text(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    pub status: i64,
    pub status_text: String,
    pub headers: Headers,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    #[serde(rename = "body_error", skip_serializing_if = "Option::is_none")]
    pub body_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    pub id: String,
    pub url: String,
    pub method: String,
    pub headers: Headers,
    pub timestamp: f64,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_data: Option<String>,
    #[serde(rename = "postDataJSON", skip_serializing_if = "Option::is_none")]
    pub post_data_json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSnapshot>,
}

/// Stand-in for an entry that could not be copied out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedRequest {
    pub url: String,
    pub method: String,
    pub error: String,
    #[serde(skip)]
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestRecord {
    Captured(RequestSnapshot),
    Degraded(DegradedRequest),
}

impl RequestRecord {
    pub fn timestamp(&self) -> f64 {
        match self {
            Self::Captured(snapshot) => snapshot.timestamp,
            Self::Degraded(degraded) => degraded.timestamp,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Captured(snapshot) => &snapshot.url,
            Self::Degraded(degraded) => &degraded.url,
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("{0}")]
    Degraded(String),

    #[error("non-finite timestamp {0}")]
    Timestamp(f64),

    #[error("response body was never resolved")]
    UnresolvedBody,
}

impl TryFrom<&NetworkResponseEntry> for ResponseSnapshot {
    type Error = SnapshotError;

    fn try_from(response: &NetworkResponseEntry) -> Result<Self, Self::Error> {
        if response.pending_body.is_some() {
            return Err(SnapshotError::UnresolvedBody);
        }
        if !response.timestamp.is_finite() {
            return Err(SnapshotError::Timestamp(response.timestamp));
        }
        Ok(Self {
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            timestamp: response.timestamp,
            body: response.body.clone(),
            body_text: response.body_text.clone(),
            body_error: response.body_error.clone(),
            error: response.error.clone(),
        })
    }
}

impl TryFrom<&NetworkRequestEntry> for RequestSnapshot {
    type Error = SnapshotError;

    fn try_from(entry: &NetworkRequestEntry) -> Result<Self, Self::Error> {
        if let Some(error) = &entry.error {
            return Err(SnapshotError::Degraded(error.clone()));
        }
        if !entry.timestamp.is_finite() {
            return Err(SnapshotError::Timestamp(entry.timestamp));
        }
        Ok(Self {
            id: entry.id.clone(),
            url: entry.url.clone(),
            method: entry.method.clone(),
            headers: entry.headers.clone(),
            timestamp: entry.timestamp,
            resource_type: entry.resource_type.clone(),
            post_data: entry.post_data.clone(),
            post_data_json: entry.post_data_json.clone(),
            response: entry.response.as_ref().map(ResponseSnapshot::try_from).transpose()?,
        })
    }
}

impl From<&NetworkRequestEntry> for RequestRecord {
    fn from(entry: &NetworkRequestEntry) -> Self {
        match RequestSnapshot::try_from(entry) {
            Ok(snapshot) => Self::Captured(snapshot),
            Err(e) => Self::Degraded(DegradedRequest {
                url: entry.url.clone(),
                method: entry.method.clone(),
                error: e.to_string(),
                timestamp: entry.timestamp,
            }),
        }
    }
}

/// Resolve pending bodies, then copy out the `last_n` most recent requests.
///
/// Body handles are taken under the store lock and read with it released,
/// so each body is fetched by exactly one caller.
pub async fn snapshot_requests(store: &SharedStore, last_n: usize) -> Vec<RequestRecord> {
    let pending = lock_store(store).take_pending_bodies();

    if !pending.is_empty() {
        tracing::debug!(count = pending.len(), "Resolving response bodies");
        let outcomes = join_all(pending.into_iter().map(|(seq, body)| async move {
            let outcome = match body.text().await {
                Ok(text) => BodyOutcome::from_text(text),
                Err(e) => {
                    tracing::warn!(seq, error = %e, "Response body unavailable");
                    BodyOutcome::Failed(e.to_string())
                }
            };
            (seq, outcome)
        }))
        .await;

        let mut guard = lock_store(store);
        for (seq, outcome) in outcomes {
            guard.apply_body(seq, outcome);
        }
    }

    let records: Vec<RequestRecord> = lock_store(store)
        .requests()
        .iter()
        .map(RequestRecord::from)
        .collect();
    most_recent(records, last_n, RequestRecord::timestamp)
}
