//! HTTP server for the ingester service.
//!
//! Provides endpoints for:
//! - `GET /status` - Files in flight with their current position, recent completions
//! - `GET /health` - Health check

use axum::{extract::Extension, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use ingestion::{ClaimRegistry, RegistryStatus};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for the HTTP server.
pub struct ServerState {
    pub registry: Arc<ClaimRegistry>,
    pub products: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(registry: Arc<ClaimRegistry>, products: Vec<String>) -> Self {
        Self {
            registry,
            products,
            started_at: Utc::now(),
        }
    }
}

/// Response for /status endpoint.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub started_at: DateTime<Utc>,
    pub products: Vec<String>,
    #[serde(flatten)]
    pub files: RegistryStatus,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub in_flight: usize,
}

async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    Json(StatusResponse {
        started_at: state.started_at,
        products: state.products.clone(),
        files: state.registry.status(),
    })
}

async fn health_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "ingester".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        in_flight: state.registry.in_flight(),
    })
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

/// Start the HTTP server.
pub async fn start_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port = port, "Starting status HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
