//! Aggregate metrics over the log tables
//!
//! Every query covers a trailing window of `days` days ending now.
//! Percentages are 0-100 with two decimals.

use super::window_start;
use idfuse_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

/// Default trailing window
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub window_days: u32,
    pub total_requests: i64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    /// Share of requests answered with a 4xx/5xx status
    pub error_rate: f64,
    /// Share of requests that returned a context answer
    pub context_usage_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionCount {
    pub decision: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStats {
    pub service_name: String,
    pub service_type: String,
    pub calls: i64,
    pub avg_latency_ms: f64,
    pub timeouts: i64,
    pub errors: i64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeoutStats {
    pub service_name: String,
    pub total_calls: i64,
    pub timeouts: i64,
    pub timeout_rate: f64,
    pub avg_latency_ms: f64,
    pub last_timeout: Option<String>,
}

/// Requests started within one UTC hour
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyVolume {
    /// Start of the hour, RFC 3339
    pub hour: String,
    pub requests: i64,
    pub avg_latency_ms: f64,
}

pub async fn summary(pool: &SqlitePool, days: u32) -> Result<MetricsSummary> {
    let rows: Vec<(f64, i64, bool)> = sqlx::query_as(
        "SELECT timing_ms, status_code, context_used FROM access_logs WHERE ts >= ?",
    )
    .bind(window_start(days))
    .fetch_all(pool)
    .await?;

    let total = rows.len();
    let mut latencies: Vec<f64> = rows.iter().map(|(ms, _, _)| *ms).collect();
    latencies.sort_by(f64::total_cmp);

    let errors = rows.iter().filter(|(_, status, _)| *status >= 400).count();
    let with_context = rows.iter().filter(|(_, _, used)| *used).count();
    let avg = if total > 0 {
        latencies.iter().sum::<f64>() / total as f64
    } else {
        0.0
    };

    Ok(MetricsSummary {
        window_days: days,
        total_requests: total as i64,
        avg_latency_ms: round2(avg),
        p50_latency_ms: round2(percentile(&latencies, 50.0)),
        p95_latency_ms: round2(percentile(&latencies, 95.0)),
        error_rate: percentage(errors as i64, total as i64),
        context_usage_rate: percentage(with_context as i64, total as i64),
    })
}

pub async fn decision_breakdown(pool: &SqlitePool, days: u32) -> Result<Vec<DecisionCount>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT decision, COUNT(*) AS count
        FROM access_logs
        WHERE ts >= ?
        GROUP BY decision
        ORDER BY count DESC, decision
        "#,
    )
    .bind(window_start(days))
    .fetch_all(pool)
    .await?;

    let total: i64 = rows.iter().map(|(_, count)| count).sum();

    Ok(rows
        .into_iter()
        .map(|(decision, count)| DecisionCount {
            decision,
            count,
            percentage: percentage(count, total),
        })
        .collect())
}

pub async fn service_stats(pool: &SqlitePool, days: u32) -> Result<Vec<ServiceStats>> {
    let rows: Vec<(String, String, i64, f64, i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT service_name,
               service_type,
               COUNT(*) AS calls,
               AVG(latency_ms),
               SUM(CASE WHEN status = 'timeout' THEN 1 ELSE 0 END),
               SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END),
               SUM(CASE WHEN status = 'ok' THEN 1 ELSE 0 END)
        FROM service_logs
        WHERE ts >= ?
        GROUP BY service_name, service_type
        ORDER BY calls DESC, service_name
        "#,
    )
    .bind(window_start(days))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(service_name, service_type, calls, avg_latency, timeouts, errors, ok)| ServiceStats {
                service_name,
                service_type,
                calls,
                avg_latency_ms: round2(avg_latency),
                timeouts,
                errors,
                success_rate: percentage(ok, calls),
            },
        )
        .collect())
}

/// Verification services with the most timeouts, worst first
///
/// Rates are over every call the service received in the window.
pub async fn top_timeouts(pool: &SqlitePool, days: u32, limit: u32) -> Result<Vec<TimeoutStats>> {
    let rows: Vec<(String, i64, i64, f64, Option<String>)> = sqlx::query_as(
        r#"
        SELECT service_name,
               COUNT(*) AS total_calls,
               SUM(CASE WHEN status = 'timeout' THEN 1 ELSE 0 END) AS timeouts,
               AVG(latency_ms),
               MAX(CASE WHEN status = 'timeout' THEN ts END)
        FROM service_logs
        WHERE ts >= ? AND service_type = 'verification'
        GROUP BY service_name
        HAVING SUM(CASE WHEN status = 'timeout' THEN 1 ELSE 0 END) > 0
        ORDER BY timeouts DESC, service_name
        LIMIT ?
        "#,
    )
    .bind(window_start(days))
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(service_name, total_calls, timeouts, avg_latency, last_timeout)| TimeoutStats {
                service_name,
                total_calls,
                timeouts,
                timeout_rate: percentage(timeouts, total_calls),
                avg_latency_ms: round2(avg_latency),
                last_timeout,
            },
        )
        .collect())
}

/// Request count and mean latency per hour, oldest first
pub async fn hourly_volume(pool: &SqlitePool, days: u32) -> Result<Vec<HourlyVolume>> {
    let rows: Vec<(String, i64, f64)> = sqlx::query_as(
        r#"
        SELECT substr(ts, 1, 13) AS hour, COUNT(*), AVG(timing_ms)
        FROM access_logs
        WHERE ts >= ?
        GROUP BY hour
        ORDER BY hour
        "#,
    )
    .bind(window_start(days))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(hour, requests, avg_latency)| HourlyVolume {
            hour: format!("{}:00:00Z", hour),
            requests,
            avg_latency_ms: round2(avg_latency),
        })
        .collect())
}

/// Nearest-rank percentile over sorted values
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(part as f64 * 100.0 / total as f64)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_access_log, insert_service_log, ServiceLogEntry};
    use chrono::{DateTime, DurationRound, Utc};
    use idfuse_common::db::init_database;
    use idfuse_common::events::IdfuseEvent;
    use idfuse_common::models::{AccessRecord, Decision, ServiceOutcome};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn access_record(ts: DateTime<Utc>, timing_ms: f64) -> AccessRecord {
        AccessRecord {
            request_id: Uuid::new_v4(),
            ts,
            route: "/identify-and-answer".to_string(),
            has_image: true,
            has_question: false,
            image_sha256: None,
            image_size_bytes: 1024,
            decision: Decision::Unknown,
            identity_label: None,
            identity_score: None,
            timing_ms,
            status_code: 200,
            services_queried: 1,
            services_ok: 1,
            services_timeout: 0,
            services_error: 0,
            context_used: false,
        }
    }

    async fn record_call(pool: &SqlitePool, outcome: ServiceOutcome) {
        let event = IdfuseEvent::ServiceCall {
            request_id: Uuid::new_v4(),
            endpoint: format!("http://localhost/{}", outcome.source_service_id),
            outcome,
            timestamp: Utc::now(),
        };
        let entry = ServiceLogEntry::from_event(&event).unwrap().unwrap();
        insert_service_log(pool, &entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_hourly_volume_groups_by_hour() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("volume.db")).await.unwrap();

        let hour = Utc::now().duration_trunc(chrono::Duration::hours(1)).unwrap()
            - chrono::Duration::hours(3);
        let earlier = hour + chrono::Duration::minutes(10);
        let later = hour + chrono::Duration::minutes(70);

        // Inserted out of order; results come back oldest first
        insert_access_log(&pool, &access_record(later, 30.0)).await.unwrap();
        insert_access_log(&pool, &access_record(earlier, 10.0)).await.unwrap();
        insert_access_log(&pool, &access_record(earlier + chrono::Duration::minutes(5), 20.0))
            .await
            .unwrap();
        // Outside a one-day window
        insert_access_log(&pool, &access_record(Utc::now() - chrono::Duration::days(3), 99.0))
            .await
            .unwrap();

        let volume = hourly_volume(&pool, 1).await.unwrap();

        assert_eq!(volume.len(), 2);
        assert_eq!(volume[0].hour, format!("{}", hour.format("%Y-%m-%dT%H:00:00Z")));
        assert_eq!(volume[0].requests, 2);
        assert_eq!(volume[0].avg_latency_ms, 15.0);
        assert_eq!(volume[1].requests, 1);
        assert_eq!(volume[1].avg_latency_ms, 30.0);
        assert!(volume[0].hour < volume[1].hour);
    }

    #[tokio::test]
    async fn test_top_timeouts_rates_over_all_calls() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("timeouts.db")).await.unwrap();

        record_call(&pool, ServiceOutcome::timeout("slow", 5000.0)).await;
        record_call(&pool, ServiceOutcome::ok("slow", vec![], 1000.0)).await;
        record_call(&pool, ServiceOutcome::timeout("flaky", 5000.0)).await;
        record_call(&pool, ServiceOutcome::timeout("flaky", 5000.0)).await;
        record_call(&pool, ServiceOutcome::ok("steady", vec![], 40.0)).await;

        let top = top_timeouts(&pool, 7, 5).await.unwrap();

        assert_eq!(top.len(), 2, "Services without timeouts are left out");
        assert_eq!(top[0].service_name, "flaky");
        assert_eq!(top[0].timeouts, 2);
        assert_eq!(top[0].timeout_rate, 100.0);
        assert_eq!(top[1].service_name, "slow");
        assert_eq!(top[1].total_calls, 2);
        assert_eq!(top[1].timeouts, 1);
        assert_eq!(top[1].timeout_rate, 50.0);
        assert_eq!(top[1].avg_latency_ms, 3000.0);
        assert!(top[1].last_timeout.is_some());

        assert_eq!(top_timeouts(&pool, 7, 1).await.unwrap().len(), 1);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(percentile(&values, 50.0), 10.0);
        assert_eq!(percentile(&values, 95.0), 19.0);
        assert_eq!(percentile(&[42.0], 95.0), 42.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 5), 100.0);
    }
}
