//! idfuse-orchestrator library interface
//!
//! Identity fusion: one image goes out to every active face-verification
//! backend at once, their candidate lists are fused into a single
//! identified / ambiguous / unknown decision, and an optional question is
//! answered by a question-answering backend in parallel.
//!
//! The pipeline is usable as a library through [`Orchestrator`] or over
//! HTTP through [`build_router`].

pub mod api;
pub mod assembler;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod fanout;
pub mod fusion;
pub mod orchestrator;
pub mod recorder;
pub mod registry;
pub mod validation;
pub mod verification;

pub use crate::error::{ApiError, ApiResult};
pub use crate::orchestrator::Orchestrator;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Room for multipart framing and the question field on top of the image
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Log database, read by the metrics endpoints
    pub db: SqlitePool,
    pub max_image_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, db: SqlitePool, max_image_bytes: usize) -> Self {
        Self {
            orchestrator,
            db,
            max_image_bytes,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_image_bytes.saturating_add(BODY_LIMIT_SLACK);

    Router::new()
        .merge(api::identify_routes())
        .merge(api::health_routes())
        .merge(api::metrics_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
