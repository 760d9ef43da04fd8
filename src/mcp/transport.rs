//! Stdio transport: newline-delimited JSON-RPC on stdin/stdout

use super::{McpError, McpServer};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

pub struct StdioTransport {
    server: Arc<McpServer>,
}

impl StdioTransport {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Serve stdin until EOF or cancellation.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), McpError> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.serve(reader, writer, cancel).await
    }

    async fn serve<R, W>(&self, mut reader: R, mut writer: W, cancel: CancellationToken) -> Result<(), McpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("MCP stdio transport ready");
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = tokio::select! {
                read = reader.read_line(&mut line) => read?,
                () = cancel.cancelled() => {
                    tracing::info!("Stdio transport cancelled");
                    break;
                }
            };

            if bytes_read == 0 {
                tracing::info!("Stdin closed");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(response) = self.server.handle_message(trimmed).await {
                let response_json = serde_json::to_string(&response)?;
                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }
}
