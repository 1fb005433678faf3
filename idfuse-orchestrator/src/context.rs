//! Context Query Client
//!
//! One bounded-time call to the question-answering backend, run alongside
//! the verification fan-out. The answer is optional: a failed or slow
//! backend yields `None` and the request still completes.
//!
//! # Wire format
//! `POST {base}/api/chat` with `{"message", "provider", "k"}`; the backend
//! answers `{"success", "result": {"answer", "sources": [...]}, "error"}`.

use async_trait::async_trait;
use idfuse_common::models::{Citation, ContextAnswer, ServiceStatus};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default timeout for a context query
pub const DEFAULT_CONTEXT_TIMEOUT: Duration = Duration::from_secs(10);

/// Health probe budget
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_PROVIDER: &str = "deepseek";
const DEFAULT_K: u32 = 5;
const MAX_K: u32 = 10;

/// Settled context query, with the bookkeeping the recorder needs
#[derive(Debug, Clone, PartialEq)]
pub struct ContextReport {
    pub answer: Option<ContextAnswer>,
    pub status: ServiceStatus,
    pub latency_ms: f64,
    /// Size of the request body sent to the backend
    pub payload_size_bytes: u64,
    pub error: Option<String>,
}

impl ContextReport {
    fn failed(status: ServiceStatus, error: String, latency_ms: f64, payload_size_bytes: u64) -> Self {
        Self {
            answer: None,
            status,
            latency_ms,
            payload_size_bytes,
            error: Some(error),
        }
    }
}

/// Question-answering backend
#[async_trait]
pub trait ContextBackend: Send + Sync {
    /// Endpoint URL, for logging
    fn endpoint(&self) -> String;

    /// Ask one question; never fails, failure is reported in the status
    async fn ask(&self, question: &str) -> ContextReport;

    /// Whether the backend answers its health probe
    async fn health_check(&self) -> bool;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    provider: &'a str,
    k: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<ChatResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResult {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    sources: Vec<ChatSource>,
}

#[derive(Debug, Deserialize)]
struct ChatSource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    page: Option<serde_json::Value>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl From<ChatSource> for Citation {
    fn from(source: ChatSource) -> Self {
        let page = match source.page {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Citation {
            doc: source
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Unknown Document".to_string()),
            page,
            section: source.section,
            url: source.url,
        }
    }
}

/// Context client over HTTP
#[derive(Clone)]
pub struct HttpContextClient {
    http_client: Client,
    base_url: String,
    timeout: Duration,
    provider: String,
    k: u32,
}

impl HttpContextClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = Client::builder().build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http_client,
            base_url,
            timeout,
            provider: DEFAULT_PROVIDER.to_string(),
            k: DEFAULT_K,
        })
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Number of retrieved passages, clamped to 1..=10
    pub fn with_k(mut self, k: u32) -> Self {
        self.k = k.clamp(1, MAX_K);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    async fn call(&self, body: &[u8]) -> Result<ContextAnswer, (ServiceStatus, String)> {
        let response = self
            .http_client
            .post(self.chat_url())
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err((ServiceStatus::Error, format!("HTTP {}", status.as_u16())));
        }

        let parsed: ChatResponse = response.json().await.map_err(classify)?;

        if !parsed.success {
            return Err((
                ServiceStatus::Error,
                parsed
                    .error
                    .unwrap_or_else(|| "backend reported failure".to_string()),
            ));
        }

        let result = parsed
            .result
            .ok_or_else(|| (ServiceStatus::Error, "response has no result".to_string()))?;

        if result.answer.trim().is_empty() {
            return Err((ServiceStatus::Error, "empty answer".to_string()));
        }

        Ok(ContextAnswer {
            text: result.answer,
            citations: result.sources.into_iter().map(Citation::from).collect(),
        })
    }
}

fn classify(error: reqwest::Error) -> (ServiceStatus, String) {
    if error.is_timeout() {
        (ServiceStatus::Timeout, "timeout".to_string())
    } else {
        (ServiceStatus::Error, error.to_string())
    }
}

#[async_trait]
impl ContextBackend for HttpContextClient {
    fn endpoint(&self) -> String {
        self.chat_url()
    }

    async fn ask(&self, question: &str) -> ContextReport {
        let started = Instant::now();

        if question.trim().is_empty() {
            return ContextReport {
                answer: None,
                status: ServiceStatus::Ok,
                latency_ms: 0.0,
                payload_size_bytes: 0,
                error: None,
            };
        }

        let request = ChatRequest {
            message: question,
            provider: &self.provider,
            k: self.k,
        };
        let body = match serde_json::to_vec(&request) {
            Ok(body) => body,
            Err(e) => return ContextReport::failed(ServiceStatus::Error, e.to_string(), 0.0, 0),
        };
        let payload_size_bytes = body.len() as u64;

        let result = match tokio::time::timeout(self.timeout, self.call(&body)).await {
            Ok(result) => result,
            Err(_) => Err((ServiceStatus::Timeout, "timeout".to_string())),
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(answer) => {
                debug!(
                    latency_ms,
                    citations = answer.citations.len(),
                    "Context query answered"
                );
                ContextReport {
                    answer: Some(answer),
                    status: ServiceStatus::Ok,
                    latency_ms,
                    payload_size_bytes,
                    error: None,
                }
            }
            Err((status, error)) => {
                warn!(status = %status, error = %error, latency_ms, "Context query failed");
                ContextReport::failed(status, error, latency_ms, payload_size_bytes)
            }
        }
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http_client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Context backend health probe failed");
                false
            }
        }
    }
}
