//! stdio and streamable-HTTP transport wiring: a `tower::service_fn`
//! fallback routes MCP JSON-RPC traffic through `StreamableHttpService`
//! while plain routes answer health checks.

use crate::server::HyperGateServer;
use rmcp::transport::{
    stdio,
    streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    },
};
use rmcp::ServiceExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub async fn serve_stdio(server: HyperGateServer) -> anyhow::Result<()> {
    info!("starting HyperGate MCP server on stdio transport");
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

pub async fn serve_http(server: HyperGateServer, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    let session_manager = Arc::new(LocalSessionManager::default());
    let http_service = StreamableHttpService::new(
        move || Ok(server.clone()),
        session_manager,
        StreamableHttpServerConfig {
            sse_keep_alive: Some(std::time::Duration::from_secs(30)),
            stateful_mode: true,
        },
    );

    let app = axum::Router::new()
        .route("/health", axum::routing::get(health_check))
        .fallback_service(tower::service_fn(move |req| {
            let service = http_service.clone();
            async move { service.handle(req).await }
        }));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "HyperGate MCP server listening (streamable HTTP, POST /mcp)");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok", "service": "hypergate-mcp" }))
}
