//! HTTP server implementation using Axum.

use crate::handlers::{handle_check_dependencies, handle_download, handle_health};
use axum::routing::{get, post};
use axum::Router;
use registry_core::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Application state shared across handlers.
pub struct AppState {
    pub registry: Registry,
}

/// Starts the HTTP server and returns the address it bound to (useful when
/// `port == 0`).
pub async fn start_server(registry: Registry, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let state = Arc::new(AppState { registry });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/models/check-dependencies", post(handle_check_dependencies))
        .route("/models/download", post(handle_download))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server error");
    });

    Ok(actual_addr)
}
