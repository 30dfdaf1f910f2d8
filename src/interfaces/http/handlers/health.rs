//! Health check and Prometheus scrape endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::interfaces::http::state::AppState;

/// Service health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub ocpi_version: String,
    pub uptime_seconds: u64,
    pub remote_parties: usize,
    pub locations: usize,
    pub tariffs: usize,
    pub sessions: usize,
    pub tokens: usize,
    pub cdrs: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stores = &state.stores;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ocpi_version: state.local.version.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        remote_parties: state.registry.len(),
        locations: stores.locations.count(),
        tariffs: stores.tariffs.count(),
        sessions: stores.sessions.count(),
        tokens: stores.tokens.count(),
        cdrs: stores.cdrs.count(),
    })
}

/// `GET /metrics`, Prometheus text format (no auth)
pub async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
