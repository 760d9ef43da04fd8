//! In-memory buffers for captured console and network entries

use super::entry::{ConsoleLogEntry, NetworkRequestEntry, NetworkResponseEntry};
use super::event::{ConsoleEvent, PendingBody, RequestEvent, ResponseEvent};
use super::filter::CaptureConfig;
use super::snapshot::BodyOutcome;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Store handle shared between the ingestion task and retrieval calls.
pub type SharedStore = Arc<Mutex<EventStore>>;

/// Lock the store, recovering the guard if a previous holder panicked.
///
/// Every critical section leaves the store consistent, so a poisoned lock
/// carries no torn state.
pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, EventStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct EventStore {
    console: Vec<ConsoleLogEntry>,
    requests: Vec<NetworkRequestEntry>,
    generation: u64,
    next_seq: u64,
    last_network_activity: Option<f64>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Bumped by every [`clear`](Self::clear).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn record_console(&mut self, event: &ConsoleEvent, timestamp: f64) {
        let entry = ConsoleLogEntry::from_event(event, timestamp).unwrap_or_else(|e| {
            tracing::warn!(kind = %event.kind, error = %e, "Storing degraded console entry");
            ConsoleLogEntry::degraded(event, timestamp, &e)
        });
        self.console.push(entry);
    }

    /// Append a request the capture filter already accepted.
    pub fn record_request(&mut self, event: &RequestEvent, timestamp: f64, config: &CaptureConfig) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = NetworkRequestEntry::from_event(event, seq, timestamp, config).unwrap_or_else(|e| {
            tracing::warn!(url = %event.url, error = %e, "Storing degraded request entry");
            NetworkRequestEntry::degraded(event, seq, timestamp, &e)
        });
        tracing::debug!(url = %entry.url, method = %entry.method, seq, "Request captured");
        self.requests.push(entry);
    }

    /// Attach a response to the request it answers.
    ///
    /// An unmatched request carrying the same identifier and URL wins;
    /// otherwise the earliest unmatched request with the same URL is
    /// claimed. Returns false, leaving the store untouched, when nothing
    /// is left to match.
    pub fn attach_response(
        &mut self,
        event: &ResponseEvent,
        timestamp: f64,
        config: &CaptureConfig,
    ) -> bool {
        let unmatched = |entry: &NetworkRequestEntry| entry.response.is_none() && entry.url == event.url;

        let by_id = event.request_id.as_deref().and_then(|id| {
            self.requests
                .iter()
                .position(|entry| unmatched(entry) && entry.id == id)
        });
        let index = by_id.or_else(|| self.requests.iter().position(|entry| unmatched(entry)));
        let Some(index) = index else {
            tracing::debug!(url = %event.url, status = event.status, "Dropping unmatched response");
            return false;
        };

        let response = NetworkResponseEntry::from_event(event, timestamp, config).unwrap_or_else(|e| {
            tracing::warn!(url = %event.url, error = %e, "Storing degraded response");
            NetworkResponseEntry::degraded(event, timestamp, &e)
        });
        self.requests[index].response = Some(response);
        true
    }

    pub fn note_network_activity(&mut self, timestamp: f64) {
        self.last_network_activity = Some(
            self.last_network_activity
                .map_or(timestamp, |last| last.max(timestamp)),
        );
    }

    /// Timestamp of the most recent network event seen, captured or not.
    pub fn last_network_activity(&self) -> Option<f64> {
        self.last_network_activity
    }

    /// Drop every entry and start a new generation.
    pub fn clear(&mut self) {
        self.console.clear();
        self.requests.clear();
        self.last_network_activity = None;
        self.generation += 1;
    }

    pub fn console_entries(&self) -> &[ConsoleLogEntry] {
        &self.console
    }

    pub fn requests(&self) -> &[NetworkRequestEntry] {
        &self.requests
    }

    /// Remove every unread body handle, keyed by request `seq`.
    ///
    /// A handle is handed out once; a concurrent caller sees it gone.
    pub fn take_pending_bodies(&mut self) -> Vec<(u64, PendingBody)> {
        self.requests
            .iter_mut()
            .filter_map(|entry| {
                let body = entry.response.as_mut()?.pending_body.take()?;
                Some((entry.seq, body))
            })
            .collect()
    }

    /// Store the result of reading a body taken by
    /// [`take_pending_bodies`](Self::take_pending_bodies).
    ///
    /// A no-op if the store was cleared in the meantime.
    pub fn apply_body(&mut self, seq: u64, outcome: BodyOutcome) {
        let Some(response) = self
            .requests
            .iter_mut()
            .find(|entry| entry.seq == seq)
            .and_then(|entry| entry.response.as_mut())
        else {
            return;
        };
        match outcome {
            BodyOutcome::Json(value) => response.body = Some(value),
            BodyOutcome::Text(text) => response.body_text = Some(text),
            BodyOutcome::Failed(error) => response.body_error = Some(error),
        }
    }
}
