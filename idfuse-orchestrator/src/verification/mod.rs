//! Verification clients
//!
//! A verification backend receives the submitted image and answers with a
//! list of scored identities. Every backend speaks its own dialect; the
//! client normalizes them into [`Candidate`](idfuse_common::models::Candidate)
//! values on a common 0.0-1.0 scale so fusion never sees the difference.
//!
//! Failure is data here: [`VerificationBackend::verify`] always returns a
//! [`ServiceOutcome`], with `status` set to `timeout` or `error` when the call
//! did not produce candidates.

pub mod http_client;
pub mod normalize;

pub use http_client::HttpVerificationClient;
pub use normalize::{normalize_response, NormalizedResponse};

use async_trait::async_trait;
use idfuse_common::models::{ServiceDescriptor, ServiceOutcome};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default per-call timeout for verification backends
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// The submitted image, shared by every backend call of one request
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub data: Arc<[u8]>,
    /// Detected MIME type, e.g. `image/jpeg`
    pub content_type: String,
    pub filename: String,
    /// Extra form fields forwarded to every backend
    pub metadata: BTreeMap<String, String>,
}

impl ImagePayload {
    pub fn new(data: impl Into<Arc<[u8]>>, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        let extension = content_type.rsplit('/').next().unwrap_or("bin").to_string();
        Self {
            data: data.into(),
            content_type,
            filename: format!("image.{}", extension),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Why a verification call produced no candidates
#[derive(Debug, Error)]
pub enum VerificationError {
    /// Connection, DNS or TLS failure
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Call exceeded its timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Backend answered with a non-success HTTP status
    #[error("Backend returned HTTP {0}")]
    HttpStatus(u16),

    /// Payload could not be understood
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl VerificationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, VerificationError::Timeout(_))
    }
}

/// One bounded-time call to one verification backend
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    /// Timeout applied to a call against `service`
    fn timeout_for(&self, service: &ServiceDescriptor) -> Duration;

    /// Perform exactly one call; never fails past this boundary
    async fn verify(&self, service: &ServiceDescriptor, image: &ImagePayload) -> ServiceOutcome;
}

/// Per-service timeout override, or `default` when absent or unusable
pub(crate) fn service_timeout(service: &ServiceDescriptor, default: Duration) -> Duration {
    service
        .timeout_secs
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .filter(|d| !d.is_zero())
        .unwrap_or(default)
}
