//! Request-scoped data model
//!
//! Everything here is plain data. Descriptors are loaded once and shared
//! read-only; candidates, outcomes and results live for one request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_threshold() -> f64 {
    0.75
}

fn default_active() -> bool {
    true
}

/// One verification backend as declared in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique service id
    pub id: String,
    /// Verification endpoint URL
    #[serde(alias = "endpoint")]
    pub endpoint_url: String,
    /// Per-service confidence threshold (0.0-1.0)
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Inactive services are skipped by the fan-out
    #[serde(default = "default_active")]
    pub active: bool,
    /// Per-call timeout override, seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
}

impl ServiceDescriptor {
    pub fn new(id: impl Into<String>, endpoint_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint_url: endpoint_url.into(),
            threshold: default_threshold(),
            active: true,
            timeout_secs: None,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_timeout_secs(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// A scored identity proposed by one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub label: String,
    /// Always within 0.0-1.0 once produced by a verification client
    pub score: f64,
    pub source_service_id: String,
}

impl Candidate {
    pub fn new(label: impl Into<String>, score: f64, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            score,
            source_service_id: source.into(),
        }
    }
}

/// How a single backend call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Ok,
    Timeout,
    Error,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Ok => "ok",
            ServiceStatus::Timeout => "timeout",
            ServiceStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one backend call, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOutcome {
    pub source_service_id: String,
    /// Present only when `status` is `Ok`
    pub candidates: Option<Vec<Candidate>>,
    pub status: ServiceStatus,
    pub latency_ms: f64,
    /// Failure description, for observability only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// At least one score was clamped into 0.0-1.0
    #[serde(default)]
    pub clamped: bool,
}

impl ServiceOutcome {
    pub fn ok(service_id: impl Into<String>, candidates: Vec<Candidate>, latency_ms: f64) -> Self {
        Self {
            source_service_id: service_id.into(),
            candidates: Some(candidates),
            status: ServiceStatus::Ok,
            latency_ms,
            error: None,
            clamped: false,
        }
    }

    pub fn timeout(service_id: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            source_service_id: service_id.into(),
            candidates: None,
            status: ServiceStatus::Timeout,
            latency_ms,
            error: Some("timeout".to_string()),
            clamped: false,
        }
    }

    pub fn error(service_id: impl Into<String>, message: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            source_service_id: service_id.into(),
            candidates: None,
            status: ServiceStatus::Error,
            latency_ms,
            error: Some(message.into()),
            clamped: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ServiceStatus::Ok
    }
}

/// Outcome of the fusion decision rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Identified,
    Ambiguous,
    Unknown,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Identified => "identified",
            Decision::Ambiguous => "ambiguous",
            Decision::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fused decision over all successful outcomes of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub decision: Decision,
    /// Set only when `decision` is `Identified`; equals `candidates[0]`
    pub identity: Option<Candidate>,
    /// Score descending, then service id ascending, then label ascending
    pub candidates: Vec<Candidate>,
}

impl FusionResult {
    pub fn unknown(candidates: Vec<Candidate>) -> Self {
        Self {
            decision: Decision::Unknown,
            identity: None,
            candidates,
        }
    }
}

/// Source reference attached to a context answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub doc: String,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Answer from the question-answering backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAnswer {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// The externally visible artifact of one "identify and answer" request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResult {
    pub decision: Decision,
    pub identity: Option<Candidate>,
    pub candidates: Vec<Candidate>,
    pub context_answer: Option<ContextAnswer>,
    pub timing_ms: f64,
    pub request_id: Uuid,
}

/// Access log entry handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub request_id: Uuid,
    pub ts: DateTime<Utc>,
    pub route: String,
    pub has_image: bool,
    pub has_question: bool,
    pub image_sha256: Option<String>,
    pub image_size_bytes: u64,
    pub decision: Decision,
    pub identity_label: Option<String>,
    pub identity_score: Option<f64>,
    pub timing_ms: f64,
    pub status_code: u16,
    pub services_queried: u32,
    pub services_ok: u32,
    pub services_timeout: u32,
    pub services_error: u32,
    pub context_used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults_from_toml() {
        let descriptor: ServiceDescriptor = toml::from_str(
            r#"
            id = "ana"
            endpoint = "http://localhost:9001/verify"
            "#,
        )
        .unwrap();

        assert_eq!(descriptor.endpoint_url, "http://localhost:9001/verify");
        assert_eq!(descriptor.threshold, 0.75);
        assert!(descriptor.active);
        assert!(descriptor.timeout_secs.is_none());
    }

    #[test]
    fn test_decision_serializes_lowercase() {
        let json = serde_json::to_string(&Decision::Identified).unwrap();
        assert_eq!(json, "\"identified\"");
        assert_eq!(Decision::Ambiguous.to_string(), "ambiguous");
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = ServiceOutcome::ok("svc", vec![Candidate::new("A", 0.9, "svc")], 12.0);
        assert!(ok.is_ok());
        assert_eq!(ok.candidates.as_ref().map(Vec::len), Some(1));

        let timeout = ServiceOutcome::timeout("svc", 5000.0);
        assert_eq!(timeout.status, ServiceStatus::Timeout);
        assert!(timeout.candidates.is_none());

        let error = ServiceOutcome::error("svc", "connection refused", 3.0);
        assert_eq!(error.status, ServiceStatus::Error);
        assert_eq!(error.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_request_result_null_context_is_explicit() {
        let result = RequestResult {
            decision: Decision::Unknown,
            identity: None,
            candidates: vec![],
            context_answer: None,
            timing_ms: 1.5,
            request_id: Uuid::nil(),
        };

        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("context_answer").unwrap().is_null());
        assert_eq!(value["decision"], "unknown");
    }
}
