//! Request handlers for the ad-hoc probe surface.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::probe::{run_probe, ProbeRequest, ProbeResult};
use crate::web::server::AppState;

/// `POST /operation` — body-driven full probe.
pub async fn handle_operation(
    State(state): State<AppState>,
    Json(request): Json<ProbeRequest>,
) -> Result<Json<ProbeResult>, (StatusCode, Json<serde_json::Value>)> {
    run_request(&state, request).await
}

#[derive(Debug, Deserialize)]
pub struct QuickParams {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    count: Option<u32>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    query_type: Option<String>,
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    status_codes: Option<String>,
}

/// `GET /operation/quick` — query-string variant.
pub async fn handle_quick_operation(
    State(state): State<AppState>,
    Query(params): Query<QuickParams>,
) -> Result<Json<ProbeResult>, (StatusCode, Json<serde_json::Value>)> {
    let request = ProbeRequest {
        kind: params.kind,
        host: params.host,
        port: params.port,
        count: params.count,
        timeout_seconds: params.timeout,
        query_type: params.query_type,
        keyword: params.keyword,
        status_codes: params.status_codes,
    };
    run_request(&state, request).await
}

async fn run_request(
    state: &AppState,
    request: ProbeRequest,
) -> Result<Json<ProbeResult>, (StatusCode, Json<serde_json::Value>)> {
    if request.host.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "host is required" })),
        ));
    }
    let count = state.config.clamp_count(request.count);
    let timeout = state.config.clamp_timeout(request.timeout_seconds);
    Ok(Json(run_probe(&request, count, timeout).await))
}

/// `GET /health` — liveness.
pub async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "store_enabled": state.config.store_enabled,
        "store_connected": state.store_connected,
        "supported_operations": ["ping", "dns", "tcp", "http", "ssl"],
    }))
}
