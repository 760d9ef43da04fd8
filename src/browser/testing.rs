//! In-process browser engine for tests
//!
//! Records every lifecycle call and lets tests push page events through
//! the same sink a real engine would use.

use super::engine::{BrowserEngine, BrowserError, BrowserHandle, PageHandle};
use super::ingest::EventSink;
use crate::capture::{BodySource, CaptureError, PageEvent};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    launches: Vec<bool>,
    navigations: Vec<String>,
    pages_opened: usize,
    pages_closed: usize,
    browsers_closed: usize,
    shutdowns: usize,
    sinks: Vec<EventSink>,
    on_navigate: Vec<PageEvent>,
    navigation_error: Option<String>,
    navigation_delay: Option<Duration>,
    fail_page_close: bool,
    fail_launch: bool,
}

/// Fake engine; clones share state.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headless flag of every launch, in order
    pub fn launches(&self) -> Vec<bool> {
        self.state.lock().unwrap().launches.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn pages_opened(&self) -> usize {
        self.state.lock().unwrap().pages_opened
    }

    pub fn pages_closed(&self) -> usize {
        self.state.lock().unwrap().pages_closed
    }

    pub fn browsers_closed(&self) -> usize {
        self.state.lock().unwrap().browsers_closed
    }

    pub fn shutdowns(&self) -> usize {
        self.state.lock().unwrap().shutdowns
    }

    /// Sink of the most recently opened page
    pub fn sink(&self) -> EventSink {
        self.state
            .lock()
            .unwrap()
            .sinks
            .last()
            .cloned()
            .expect("no page has been opened")
    }

    /// Events emitted by every subsequent navigation, before it returns
    pub fn on_navigate(&self, events: Vec<PageEvent>) {
        self.state.lock().unwrap().on_navigate = events;
    }

    pub fn fail_navigation(&self, reason: &str) {
        self.state.lock().unwrap().navigation_error = Some(reason.to_string());
    }

    pub fn delay_navigation(&self, delay: Duration) {
        self.state.lock().unwrap().navigation_delay = Some(delay);
    }

    pub fn fail_page_close(&self) {
        self.state.lock().unwrap().fail_page_close = true;
    }

    pub fn fail_launch(&self) {
        self.state.lock().unwrap().fail_launch = true;
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserHandle>, BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_launch {
            return Err(BrowserError::LaunchFailed("fake launch failure".to_string()));
        }
        state.launches.push(headless);
        Ok(Box::new(FakeBrowser {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_page(&self, sink: EventSink) -> Result<Arc<dyn PageHandle>, BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.pages_opened += 1;
        state.sinks.push(sink.clone());
        Ok(Arc::new(FakePage {
            state: Arc::clone(&self.state),
            sink,
        }))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.state.lock().unwrap().browsers_closed += 1;
        Ok(())
    }

    async fn shutdown(self: Box<Self>) -> Result<(), BrowserError> {
        self.state.lock().unwrap().shutdowns += 1;
        Ok(())
    }
}

struct FakePage {
    state: Arc<Mutex<FakeState>>,
    sink: EventSink,
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let (events, error, delay) = {
            let mut state = self.state.lock().unwrap();
            state.navigations.push(url.to_string());
            (
                state.on_navigate.clone(),
                state.navigation_error.clone(),
                state.navigation_delay,
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = error {
            return Err(BrowserError::NavigationFailed {
                url: url.to_string(),
                reason,
            });
        }
        for event in events {
            self.sink.emit(event);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        state.pages_closed += 1;
        if state.fail_page_close {
            return Err(BrowserError::OperationFailed("fake page close failure".to_string()));
        }
        Ok(())
    }
}

/// Body that is already known, or fails with the given message.
pub struct StaticBody(pub Result<String, String>);

#[async_trait]
impl BodySource for StaticBody {
    async fn text(&self) -> Result<String, CaptureError> {
        self.0.clone().map_err(CaptureError::BodyFetch)
    }
}
