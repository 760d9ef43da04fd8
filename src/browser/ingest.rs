//! Ingestion channel between engine callbacks and the capture store

use crate::capture::event::{ConsoleEvent, PageEvent, TimedEvent};
use crate::capture::{lock_store, should_capture, CaptureConfig, Clock, EventStore, SharedStore};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

pub(crate) enum Ingest {
    Event(TimedEvent),
    /// Acknowledged once every message queued ahead of it is applied
    Flush(oneshot::Sender<()>),
}

/// Non-blocking entry point for engine callbacks.
///
/// Events are stamped with the session clock when emitted, not when they
/// are applied.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Ingest>,
    clock: Clock,
}

impl EventSink {
    pub fn emit(&self, event: PageEvent) {
        self.emit_at(self.clock.now(), event);
    }

    pub fn emit_at(&self, timestamp: f64, event: PageEvent) {
        match self.tx.try_send(Ingest::Event(TimedEvent { timestamp, event })) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Event buffer full, dropping page event");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Page no longer monitored, dropping page event");
            }
        }
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Wait until every event emitted before this call has reached the store.
    ///
    /// Returns false if the page is no longer being monitored.
    pub async fn flush(&self) -> bool {
        let (done, acked) = oneshot::channel();
        if self.tx.send(Ingest::Flush(done)).await.is_err() {
            return false;
        }
        acked.await.is_ok()
    }
}

/// Consumer task for one page; the only writer of captured entries.
///
/// Dropping it stops the task, after which the page's sinks discard events.
pub(crate) struct Ingestor {
    sink: EventSink,
    task: JoinHandle<()>,
}

impl Ingestor {
    pub fn spawn(
        store: SharedStore,
        config: watch::Receiver<Arc<CaptureConfig>>,
        clock: Clock,
        capacity: usize,
        page_url: String,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let generation = lock_store(&store).generation();
        let task = tokio::spawn(drain(rx, store, config, generation, page_url));
        Self {
            sink: EventSink { tx, clock },
            task,
        }
    }

    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }
}

impl Drop for Ingestor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drain(
    mut rx: mpsc::Receiver<Ingest>,
    store: SharedStore,
    config: watch::Receiver<Arc<CaptureConfig>>,
    generation: u64,
    page_url: String,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Ingest::Event(event) => {
                let config = Arc::clone(&config.borrow());
                let mut store = lock_store(&store);
                if store.generation() != generation {
                    tracing::debug!("Store cleared since page opened, dropping event");
                    continue;
                }
                apply(&mut store, event, &config, &page_url);
            }
            Ingest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn apply(store: &mut EventStore, timed: TimedEvent, config: &CaptureConfig, page_url: &str) {
    let TimedEvent { timestamp, event } = timed;
    match event {
        PageEvent::Console(mut console) => {
            fill_page(&mut console, page_url);
            tracing::debug!(kind = %console.kind, "Console message captured");
            store.record_console(&console, timestamp);
        }
        PageEvent::Request(request) => {
            store.note_network_activity(timestamp);
            if should_capture(&request, config) {
                store.record_request(&request, timestamp, config);
            } else {
                tracing::debug!(url = %request.url, resource_type = %request.resource_type, "Request filtered out");
            }
        }
        PageEvent::Response(response) => {
            store.note_network_activity(timestamp);
            store.attach_response(&response, timestamp, config);
        }
    }
}

fn fill_page(console: &mut ConsoleEvent, page_url: &str) {
    if console.page.is_none() {
        console.page = Some(page_url.to_string());
    }
}
