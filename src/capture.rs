//! Event capture and correlation engine
//!
//! Filters, buffers, correlates and snapshots the console and network
//! events reported by the monitored page. Nothing in here talks to a
//! browser directly; engines feed [`event::PageEvent`]s in and callers read
//! plain, serializable snapshots out.

mod dedup;
pub mod entry;
pub mod event;
pub mod filter;
mod snapshot;
pub mod store;

#[cfg(test)]
mod proptests;

pub use dedup::{dedup, DeduplicatedLogGroup};
pub use event::{BodySource, Clock, PageEvent, PendingBody};
pub use filter::{should_capture, CaptureConfig, CaptureConfigUpdate};
pub use snapshot::{snapshot_requests, RequestRecord};
pub use store::{lock_store, EventStore, SharedStore};

use thiserror::Error;

/// Failure to turn a raw page event into a stored entry.
///
/// Never surfaces to the engine: the store swaps in a degraded record
/// carrying the message instead.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("malformed {field}: {source}")]
    Malformed {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("headers must be an object of strings, got {0}")]
    Headers(String),

    #[error("failed to read response body: {0}")]
    BodyFetch(String),
}

/// Keep the `last_n` most recent items, returned oldest first.
///
/// Sorting is stable, so items sharing a timestamp keep their insertion
/// order in the output.
pub(crate) fn most_recent<T>(mut items: Vec<T>, last_n: usize, timestamp: impl Fn(&T) -> f64) -> Vec<T> {
    items.sort_by(|a, b| timestamp(b).total_cmp(&timestamp(a)));
    items.truncate(last_n);
    items.sort_by(|a, b| timestamp(a).total_cmp(&timestamp(b)));
    items
}
