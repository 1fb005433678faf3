//! HTTP verification client
//!
//! Posts the image as `multipart/form-data` (part name `image`, plus one text
//! part per metadata entry) to the service's endpoint and normalizes the JSON
//! answer.

use super::{
    normalize_response, service_timeout, ImagePayload, VerificationBackend, VerificationError,
    DEFAULT_VERIFY_TIMEOUT,
};
use async_trait::async_trait;
use idfuse_common::models::{ServiceDescriptor, ServiceOutcome};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Connection establishment budget, part of the per-call timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Verification client over HTTP
///
/// One instance serves every registry entry; the underlying connection pool
/// is shared across calls and requests.
#[derive(Clone)]
pub struct HttpVerificationClient {
    http_client: Client,
    default_timeout: Duration,
}

impl HttpVerificationClient {
    /// Create a client with the given default per-call timeout
    pub fn new(default_timeout: Duration) -> Result<Self, VerificationError> {
        let http_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(default_timeout))
            .build()
            .map_err(|e| VerificationError::Transport(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http_client,
            default_timeout,
        })
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    async fn call(
        &self,
        service: &ServiceDescriptor,
        image: &ImagePayload,
        timeout: Duration,
    ) -> Result<super::NormalizedResponse, VerificationError> {
        let image_part = Part::bytes(image.data.to_vec())
            .file_name(image.filename.clone())
            .mime_str(&image.content_type)
            .map_err(|e| VerificationError::Transport(format!("Invalid content type: {}", e)))?;

        let mut form = Form::new().part("image", image_part);
        for (key, value) in &image.metadata {
            form = form.text(key.clone(), value.clone());
        }

        let response = self
            .http_client
            .post(&service.endpoint_url)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerificationError::HttpStatus(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                VerificationError::Timeout(timeout)
            } else {
                VerificationError::MalformedResponse(format!("Invalid JSON: {}", e))
            }
        })?;

        normalize_response(&service.id, &body)
    }
}

fn classify_reqwest_error(error: reqwest::Error, timeout: Duration) -> VerificationError {
    if error.is_timeout() {
        VerificationError::Timeout(timeout)
    } else {
        VerificationError::Transport(error.to_string())
    }
}

#[async_trait]
impl VerificationBackend for HttpVerificationClient {
    fn timeout_for(&self, service: &ServiceDescriptor) -> Duration {
        service_timeout(service, self.default_timeout)
    }

    async fn verify(&self, service: &ServiceDescriptor, image: &ImagePayload) -> ServiceOutcome {
        let timeout = self.timeout_for(service);
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, self.call(service, image, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(VerificationError::Timeout(timeout)),
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(response) => {
                if response.clamped > 0 {
                    warn!(
                        service_id = %service.id,
                        clamped = response.clamped,
                        "Scores outside 0.0-1.0 clamped"
                    );
                }
                debug!(
                    service_id = %service.id,
                    candidates = response.candidates.len(),
                    latency_ms,
                    "Verification call succeeded"
                );
                let mut outcome = ServiceOutcome::ok(&service.id, response.candidates, latency_ms);
                outcome.clamped = response.clamped > 0;
                outcome
            }
            Err(e) if e.is_timeout() => {
                warn!(service_id = %service.id, latency_ms, "Verification call timed out");
                ServiceOutcome::timeout(&service.id, latency_ms)
            }
            Err(e) => {
                warn!(
                    service_id = %service.id,
                    error = %e,
                    latency_ms,
                    "Verification call failed"
                );
                ServiceOutcome::error(&service.id, e.to_string(), latency_ms)
            }
        }
    }
}

impl Default for HttpVerificationClient {
    fn default() -> Self {
        Self {
            http_client: Client::new(),
            default_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idfuse_common::models::ServiceStatus;

    #[test]
    fn test_default_timeout() {
        let client = HttpVerificationClient::default();
        assert_eq!(client.default_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_for_respects_override() {
        let client = HttpVerificationClient::new(Duration::from_secs(3)).unwrap();
        let service = ServiceDescriptor::new("svc", "http://localhost/verify");
        assert_eq!(client.timeout_for(&service), Duration::from_secs(3));
        assert_eq!(
            client.timeout_for(&service.with_timeout_secs(1.0)),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_error_outcome() {
        // Bind then drop to obtain a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = HttpVerificationClient::new(Duration::from_secs(2)).unwrap();
        let service = ServiceDescriptor::new("down", format!("http://127.0.0.1:{}/verify", port));
        let image = ImagePayload::new(vec![0xFFu8, 0xD8, 0xFF], "image/jpeg");

        let outcome = client.verify(&service, &image).await;
        assert_eq!(outcome.status, ServiceStatus::Error);
        assert!(outcome.candidates.is_none());
        assert_eq!(outcome.source_service_id, "down");
    }
}
