//! The monitored browser session
//!
//! One [`MonitorSession`] exists per process. It owns the browser, the
//! single monitored page, the capture store and the live capture
//! configuration. Lifecycle transitions are serialized; retrievals and
//! navigation run without holding the lifecycle lock.

use super::engine::{BrowserEngine, BrowserError, BrowserHandle, PageHandle};
use super::ingest::{EventSink, Ingestor};
use crate::capture::{
    dedup, lock_store, snapshot_requests, CaptureConfig, CaptureConfigUpdate, Clock,
    DeduplicatedLogGroup, EventStore, RequestRecord, SharedStore,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Upper bound on navigation and on the network-idle wait after it
    pub navigation_timeout: Duration,
    /// Quiet period that counts as network idle
    pub idle_window: Duration,
    /// Capacity of the per-page ingestion channel
    pub event_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            idle_window: Duration::from_millis(500),
            event_buffer: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    Initialized,
    PageOpen,
}

struct ActivePage {
    handle: Arc<dyn PageHandle>,
    ingestor: Ingestor,
}

#[derive(Default)]
struct Lifecycle {
    browser: Option<Box<dyn BrowserHandle>>,
    page: Option<ActivePage>,
}

pub struct MonitorSession {
    engine: Arc<dyn BrowserEngine>,
    settings: SessionSettings,
    clock: Clock,
    store: SharedStore,
    config: watch::Sender<Arc<CaptureConfig>>,
    lifecycle: Mutex<Lifecycle>,
}

impl MonitorSession {
    pub fn new(engine: Arc<dyn BrowserEngine>, settings: SessionSettings) -> Self {
        let (config, _) = watch::channel(Arc::new(CaptureConfig::default()));
        Self {
            engine,
            settings,
            clock: Clock::new(),
            store: EventStore::shared(),
            config,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        let lifecycle = self.lifecycle.lock().await;
        match (&lifecycle.browser, &lifecycle.page) {
            (None, _) => SessionPhase::Uninitialized,
            (Some(_), None) => SessionPhase::Initialized,
            (Some(_), Some(_)) => SessionPhase::PageOpen,
        }
    }

    /// Launch the browser if it is not running yet.
    ///
    /// `headless` only takes effect on the call that actually launches.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn initialize(&self, headless: bool) -> Result<(), BrowserError> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.ensure_browser(&mut lifecycle, headless).await
    }

    async fn ensure_browser(&self, lifecycle: &mut Lifecycle, headless: bool) -> Result<(), BrowserError> {
        if lifecycle.browser.is_some() {
            tracing::debug!("Browser already initialized");
            return Ok(());
        }
        tracing::info!(headless, "Initializing browser");
        lifecycle.browser = Some(self.engine.launch(headless).await?);
        Ok(())
    }

    /// Open `url` in a fresh page and start monitoring it.
    ///
    /// Any previous page is closed and everything captured from it is
    /// discarded. Returns once the page has loaded and the network has
    /// gone quiet, or the navigation timeout ran out waiting for quiet.
    pub async fn open_url(&self, url: &str, headless: bool) -> Result<String, BrowserError> {
        tracing::info!(url, headless, "Opening page");
        let (page, sink) = {
            let mut lifecycle = self.lifecycle.lock().await;
            self.ensure_browser(&mut lifecycle, headless).await?;

            if let Some(previous) = lifecycle.page.take() {
                tracing::debug!("Closing previous page");
                drop(previous.ingestor);
                if let Err(e) = previous.handle.close().await {
                    tracing::warn!(error = %e, "Failed to close previous page");
                }
            }
            lock_store(&self.store).clear();

            let ingestor = Ingestor::spawn(
                Arc::clone(&self.store),
                self.config.subscribe(),
                self.clock,
                self.settings.event_buffer,
                url.to_string(),
            );
            let browser = lifecycle
                .browser
                .as_ref()
                .ok_or_else(|| BrowserError::OperationFailed("browser is not running".to_string()))?;
            let handle = browser.new_page(ingestor.sink()).await?;
            let sink = ingestor.sink();
            lifecycle.page = Some(ActivePage {
                handle: Arc::clone(&handle),
                ingestor,
            });
            (handle, sink)
        };

        let started = self.clock.now();
        let timeout = self.settings.navigation_timeout;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BrowserError::NavigationTimeout {
                    url: url.to_string(),
                    timeout,
                })
            }
        }
        self.wait_for_network_idle(&sink, started).await;

        tracing::info!(url, "Page loaded");
        Ok(format!(
            "Opened {url} successfully. The browser window will remain open for you to interact with."
        ))
    }

    /// Poll until no network event has arrived for the idle window.
    ///
    /// Gives up with a warning after the navigation timeout; also stops
    /// early if the page is closed underneath it.
    async fn wait_for_network_idle(&self, sink: &EventSink, started: f64) -> bool {
        let deadline = Instant::now() + self.settings.navigation_timeout;
        let idle_window = self.settings.idle_window.as_secs_f64();

        loop {
            if !sink.flush().await {
                tracing::debug!("Page closed while waiting for network idle");
                return false;
            }
            let last = lock_store(&self.store)
                .last_network_activity()
                .map_or(started, |last| last.max(started));
            if self.clock.now() - last >= idle_window {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    timeout = ?self.settings.navigation_timeout,
                    "Network did not go idle before timeout"
                );
                return false;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL.min(self.settings.idle_window)).await;
        }
    }

    /// Close page and browser and drop everything captured.
    ///
    /// Safe to call in any phase. Every teardown step runs even if an
    /// earlier one fails; the first failure is returned after the session
    /// has been reset.
    pub async fn close(&self) -> Result<(), BrowserError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let mut first_error = None;

        if let Some(page) = lifecycle.page.take() {
            tracing::info!("Closing page");
            drop(page.ingestor);
            if let Err(e) = page.handle.close().await {
                tracing::warn!(error = %e, "Failed to close page");
                first_error.get_or_insert(e);
            }
        }

        if let Some(mut browser) = lifecycle.browser.take() {
            tracing::info!("Closing browser");
            if let Err(e) = browser.close().await {
                tracing::warn!(error = %e, "Failed to close browser");
                first_error.get_or_insert(e);
            }
            if let Err(e) = browser.shutdown().await {
                tracing::warn!(error = %e, "Failed to stop browser driver");
                first_error.get_or_insert(e);
            }
        }

        lock_store(&self.store).clear();
        tracing::info!("Browser resources released");
        first_error.map_or(Ok(()), Err)
    }

    /// Wait for every event delivered so far to reach the store.
    pub async fn flush(&self) {
        let sink = {
            let lifecycle = self.lifecycle.lock().await;
            lifecycle.page.as_ref().map(|page| page.ingestor.sink())
        };
        if let Some(sink) = sink {
            sink.flush().await;
        }
    }

    pub async fn get_console_logs(&self, last_n: usize) -> Vec<DeduplicatedLogGroup> {
        self.flush().await;
        let store = lock_store(&self.store);
        dedup(store.console_entries(), last_n)
    }

    pub async fn get_network_requests(&self, last_n: usize) -> Vec<RequestRecord> {
        self.flush().await;
        snapshot_requests(&self.store, last_n).await
    }

    /// Merge `update` into the live configuration and return the result.
    ///
    /// Applies to events ingested after the call returns.
    pub fn configure_capture(&self, update: CaptureConfigUpdate) -> CaptureConfig {
        self.config.send_modify(|current| {
            *current = Arc::new(current.merged(update));
        });
        let config = self.capture_config();
        tracing::info!(enabled = config.enabled, "Network capture configuration updated");
        config
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig::clone(&self.config.borrow())
    }
}
