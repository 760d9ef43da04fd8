//! HTTP transport: JSON-RPC on `POST /mcp`, liveness on `GET /health`

use super::{McpError, McpServer};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub fn create_router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_jsonrpc))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

/// Serve until `cancel` fires.
pub async fn serve(server: Arc<McpServer>, addr: SocketAddr, cancel: CancellationToken) -> Result<(), McpError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "MCP HTTP transport listening");
    serve_on(listener, server, cancel).await
}

async fn serve_on(
    listener: tokio::net::TcpListener,
    server: Arc<McpServer>,
    cancel: CancellationToken,
) -> Result<(), McpError> {
    axum::serve(listener, create_router(server))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

// The body is parsed by hand so malformed JSON gets a JSON-RPC parse error
async fn handle_jsonrpc(State(server): State<Arc<McpServer>>, body: String) -> Response {
    match server.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_health(State(server): State<Arc<McpServer>>) -> impl IntoResponse {
    let info = server.server_info();
    let browser = server.session().phase().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "server": info.name,
            "version": info.version,
            "browser": browser,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tests::test_server;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn spawn_server() -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<Result<(), McpError>>) {
        let (server, _engine) = test_server();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(serve_on(listener, Arc::new(server), cancel.clone()));
        (addr, cancel, handle)
    }

    async fn raw_request(addr: SocketAddr, request: String) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    fn post(body: &str) -> String {
        format!(
            "POST /mcp HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn test_health() {
        let (addr, cancel, handle) = spawn_server().await;
        let response = raw_request(
            addr,
            "GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string(),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains(r#""status":"healthy""#));
        assert!(response.contains(r#""browser":"uninitialized""#));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_post_ping() {
        let (addr, cancel, _handle) = spawn_server().await;
        let response = raw_request(addr, post(r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#)).await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains(r#""id":3"#));
        assert!(response.contains(r#""result":{}"#));
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_post_notification_is_accepted() {
        let (addr, cancel, _handle) = spawn_server().await;
        let response = raw_request(
            addr,
            post(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 202"), "{response}");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_post_malformed_body() {
        let (addr, cancel, _handle) = spawn_server().await;
        let response = raw_request(addr, post("{oops")).await;
        assert!(response.contains("-32700"), "{response}");
        cancel.cancel();
    }
}
