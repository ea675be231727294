//! Router construction and server startup.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::web::handlers;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store_connected: bool,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/operation", post(handlers::handle_operation))
        .route("/operation/quick", get(handlers::handle_quick_operation))
        // legacy aliases
        .route("/ping", post(handlers::handle_operation))
        .route("/ping/quick", get(handlers::handle_quick_operation))
        .route("/health", get(handlers::handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the process exits. A bind failure here is the only fatal
/// startup error.
pub async fn start_web_server(state: AppState) -> Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("HTTP server listening on {addr}");
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
