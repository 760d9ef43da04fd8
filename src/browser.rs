//! Browser lifecycle and page event plumbing
//!
//! A [`MonitorSession`] owns the browser and the single monitored page.
//! Engines report page events through an [`EventSink`]; one ingestion task
//! per page filters them and writes them into the capture store.

pub mod chromium;
pub mod engine;
mod ingest;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;


pub use chromium::ChromiumEngine;
pub use session::{MonitorSession, SessionSettings};
