//! Service-call and access log writes

use super::format_ts;
use idfuse_common::events::{IdfuseEvent, ServiceKind};
use idfuse_common::models::{AccessRecord, ServiceStatus};
use idfuse_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;

/// One row of `service_logs`
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ServiceLogEntry {
    pub request_id: String,
    pub ts: String,
    /// `verification` or `context`
    pub service_type: String,
    pub service_name: String,
    pub endpoint: String,
    pub status: String,
    pub latency_ms: f64,
    pub candidate_count: Option<i64>,
    pub payload_size_bytes: Option<i64>,
    pub timeout: bool,
    pub error: Option<String>,
    /// Candidate list as JSON, verification calls only
    pub result: Option<String>,
}

impl ServiceLogEntry {
    /// Row for a service-call event; `None` for other events
    pub fn from_event(event: &IdfuseEvent) -> Result<Option<Self>> {
        let entry = match event {
            IdfuseEvent::ServiceCall {
                request_id,
                endpoint,
                outcome,
                timestamp,
            } => {
                let result = outcome
                    .candidates
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| Error::Internal(format!("Failed to serialize candidates: {}", e)))?;

                ServiceLogEntry {
                    request_id: request_id.to_string(),
                    ts: format_ts(*timestamp),
                    service_type: ServiceKind::Verification.as_str().to_string(),
                    service_name: outcome.source_service_id.clone(),
                    endpoint: endpoint.clone(),
                    status: outcome.status.as_str().to_string(),
                    latency_ms: outcome.latency_ms,
                    candidate_count: outcome.candidates.as_ref().map(|c| c.len() as i64),
                    payload_size_bytes: None,
                    timeout: outcome.status == ServiceStatus::Timeout,
                    error: outcome.error.clone(),
                    result,
                }
            }
            IdfuseEvent::ContextCall {
                request_id,
                endpoint,
                status,
                latency_ms,
                payload_size_bytes,
                error,
                timestamp,
            } => ServiceLogEntry {
                request_id: request_id.to_string(),
                ts: format_ts(*timestamp),
                service_type: ServiceKind::Context.as_str().to_string(),
                service_name: ServiceKind::Context.as_str().to_string(),
                endpoint: endpoint.clone(),
                status: status.as_str().to_string(),
                latency_ms: *latency_ms,
                candidate_count: None,
                payload_size_bytes: Some(*payload_size_bytes as i64),
                timeout: *status == ServiceStatus::Timeout,
                error: error.clone(),
                result: None,
            },
            IdfuseEvent::RequestCompleted { .. } => return Ok(None),
        };
        Ok(Some(entry))
    }
}

pub async fn insert_service_log(pool: &SqlitePool, entry: &ServiceLogEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO service_logs (
            request_id, ts, service_type, service_name, endpoint, status,
            latency_ms, candidate_count, payload_size_bytes, timeout, error, result
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.request_id)
    .bind(&entry.ts)
    .bind(&entry.service_type)
    .bind(&entry.service_name)
    .bind(&entry.endpoint)
    .bind(&entry.status)
    .bind(entry.latency_ms)
    .bind(entry.candidate_count)
    .bind(entry.payload_size_bytes)
    .bind(entry.timeout)
    .bind(&entry.error)
    .bind(&entry.result)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert one access record; a repeated request id replaces the old row
pub async fn insert_access_log(pool: &SqlitePool, record: &AccessRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO access_logs (
            request_id, ts, route, has_image, has_question, image_sha256,
            image_size_bytes, decision, identity_label, identity_score, timing_ms,
            status_code, services_queried, services_ok, services_timeout,
            services_error, context_used
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.request_id.to_string())
    .bind(format_ts(record.ts))
    .bind(&record.route)
    .bind(record.has_image)
    .bind(record.has_question)
    .bind(&record.image_sha256)
    .bind(record.image_size_bytes as i64)
    .bind(record.decision.as_str())
    .bind(&record.identity_label)
    .bind(record.identity_score)
    .bind(record.timing_ms)
    .bind(i64::from(record.status_code))
    .bind(i64::from(record.services_queried))
    .bind(i64::from(record.services_ok))
    .bind(i64::from(record.services_timeout))
    .bind(i64::from(record.services_error))
    .bind(record.context_used)
    .execute(pool)
    .await?;

    Ok(())
}

/// All service-log rows of one request, oldest first
pub async fn service_logs_for_request(pool: &SqlitePool, request_id: &str) -> Result<Vec<ServiceLogEntry>> {
    let rows = sqlx::query_as::<_, ServiceLogEntry>(
        r#"
        SELECT request_id, ts, service_type, service_name, endpoint, status,
               latency_ms, candidate_count, payload_size_bytes, timeout, error, result
        FROM service_logs
        WHERE request_id = ?
        ORDER BY id
        "#,
    )
    .bind(request_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
