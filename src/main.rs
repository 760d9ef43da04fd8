//! Browser monitor - MCP server for browser console and network capture
//!
//! Opens pages in Chrome, records their console output and network traffic,
//! and serves the captured data to MCP clients.

mod browser;
mod capture;
mod config;
mod mcp;
mod tools;

use browser::{ChromiumEngine, MonitorSession};
use config::{Settings, Transport};
use mcp::{http, transport::StdioTransport, McpServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tools::ToolRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Stdout belongs to the stdio transport; logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "browser_monitor=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let settings = Settings::from_env();
    tracing::info!(
        transport = ?settings.transport,
        navigation_timeout = ?settings.session.navigation_timeout,
        idle_window = ?settings.session.idle_window,
        "Starting browser monitor"
    );

    let engine = Arc::new(ChromiumEngine::new(
        settings.chrome_executable.clone(),
        settings.chrome_cache_dir.clone(),
    ));
    let session = Arc::new(MonitorSession::new(engine, settings.session.clone()));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
            }
            cancel.cancel();
        }
    });

    let server = Arc::new(McpServer::new(
        ToolRegistry::standard(),
        Arc::clone(&session),
        cancel.clone(),
    ));

    let served = match settings.transport {
        Transport::Stdio => StdioTransport::new(server).run(cancel.clone()).await,
        Transport::Http => {
            let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
            http::serve(server, addr, cancel.clone()).await
        }
    };
    cancel.cancel();

    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Browser did not shut down cleanly");
    }
    served?;

    tracing::info!("Browser monitor stopped");
    Ok(())
}
