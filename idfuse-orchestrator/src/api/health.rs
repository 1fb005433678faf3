//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when no verification service is active or the
    /// context backend is configured but unreachable
    pub status: String,
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub services_active: usize,
    pub services_total: usize,
    pub context_configured: bool,
    /// Result of the context backend probe; absent when not configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_available: Option<bool>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let registry = state.orchestrator.registry();
    let services_active = registry.active_count();

    let context_available = match state.orchestrator.context() {
        Some(context) => Some(context.health_check().await),
        None => None,
    };

    let degraded = services_active == 0 || context_available == Some(false);

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" }.to_string(),
        module: "idfuse-orchestrator".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        services_active,
        services_total: registry.len(),
        context_configured: context_available.is_some(),
        context_available,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
