//! Seam between the session and a concrete browser engine

use super::ingest::EventSink;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("Browser operation failed: {0}")]
    OperationFailed(String),

    #[error("Chrome not available: {0}")]
    ChromeNotAvailable(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        BrowserError::OperationFailed(e.to_string())
    }
}

/// Something that can start a browser.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserHandle>, BrowserError>;
}

/// A running browser.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Open a blank page whose console, request and response events are
    /// pushed into `sink` until the page closes.
    async fn new_page(&self, sink: EventSink) -> Result<Arc<dyn PageHandle>, BrowserError>;

    /// Close the browser process.
    async fn close(&mut self) -> Result<(), BrowserError>;

    /// Stop the protocol driver and release local resources.
    async fn shutdown(self: Box<Self>) -> Result<(), BrowserError>;
}

/// The monitored page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for the load event.
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}
