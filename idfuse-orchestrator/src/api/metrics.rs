//! Metrics API handlers
//!
//! GET /metrics/summary, /metrics/decisions, /metrics/services,
//! /metrics/volume, /metrics/timeouts. All take `?days=N` (default 7, 1-365);
//! `/metrics/timeouts` also takes `?limit=M` (default 5, 1-100).

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::metrics::{self, DEFAULT_WINDOW_DAYS};
use crate::db::{DecisionCount, HourlyVolume, MetricsSummary, ServiceStats, TimeoutStats};
use crate::error::ApiResult;
use crate::AppState;

const MAX_WINDOW_DAYS: u32 = 365;
const DEFAULT_LIMIT: u32 = 5;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub days: Option<u32>,
    pub limit: Option<u32>,
}

impl MetricsQuery {
    fn days(&self) -> u32 {
        self.days
            .unwrap_or(DEFAULT_WINDOW_DAYS)
            .clamp(1, MAX_WINDOW_DAYS)
    }

    fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// List response with the window it covers
#[derive(Debug, Serialize)]
pub struct WindowedResponse<T> {
    pub window_days: u32,
    pub items: Vec<T>,
}

pub async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<MetricsSummary>> {
    Ok(Json(metrics::summary(&state.db, query.days()).await?))
}

pub async fn get_decisions(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<WindowedResponse<DecisionCount>>> {
    let days = query.days();
    let items = metrics::decision_breakdown(&state.db, days).await?;
    Ok(Json(WindowedResponse { window_days: days, items }))
}

pub async fn get_services(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<WindowedResponse<ServiceStats>>> {
    let days = query.days();
    let items = metrics::service_stats(&state.db, days).await?;
    Ok(Json(WindowedResponse { window_days: days, items }))
}

pub async fn get_volume(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<WindowedResponse<HourlyVolume>>> {
    let days = query.days();
    let items = metrics::hourly_volume(&state.db, days).await?;
    Ok(Json(WindowedResponse { window_days: days, items }))
}

pub async fn get_timeouts(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<WindowedResponse<TimeoutStats>>> {
    let days = query.days();
    let items = metrics::top_timeouts(&state.db, days, query.limit()).await?;
    Ok(Json(WindowedResponse { window_days: days, items }))
}

pub fn metrics_routes() -> Router<AppState> {
    Router::new()
        .route("/metrics/summary", get(get_summary))
        .route("/metrics/decisions", get(get_decisions))
        .route("/metrics/services", get(get_services))
        .route("/metrics/volume", get(get_volume))
        .route("/metrics/timeouts", get(get_timeouts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults_and_clamping() {
        let query = MetricsQuery::default();
        assert_eq!(query.days(), 7);
        assert_eq!(query.limit(), 5);

        let query = MetricsQuery {
            days: Some(0),
            limit: Some(1000),
        };
        assert_eq!(query.days(), 1);
        assert_eq!(query.limit(), 100);
    }
}
