//! Database access for the orchestrator
//!
//! Schema creation lives in `idfuse_common::db`; this module holds the
//! writes the recorder performs and the aggregate reads behind `/metrics`.

pub mod logs;
pub mod metrics;
pub mod retry;

pub use logs::{insert_access_log, insert_service_log, service_logs_for_request, ServiceLogEntry};
pub use metrics::{
    decision_breakdown, hourly_volume, service_stats, summary, top_timeouts, DecisionCount,
    HourlyVolume, MetricsSummary, ServiceStats, TimeoutStats,
};
pub use retry::retry_on_lock;

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamps are stored as fixed-width RFC 3339 UTC so that string
/// comparison orders them chronologically
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Start of a trailing window of `days` days
pub(crate) fn window_start(days: u32) -> String {
    format_ts(Utc::now() - chrono::Duration::days(i64::from(days)))
}
