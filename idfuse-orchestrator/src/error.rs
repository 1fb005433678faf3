//! Error types for the HTTP surface

use crate::fusion::FusionError;
use crate::validation::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload over the size limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Backend results broke the score contract
    #[error(transparent)]
    Fusion(#[from] FusionError),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// idfuse-common error
    #[error("Common error: {0}")]
    Common(#[from] idfuse_common::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_)
            | ApiError::Fusion(_)
            | ApiError::Other(_)
            | ApiError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Internal(_) | ApiError::Other(_) => "INTERNAL_ERROR",
            ApiError::Fusion(_) => "FUSION_ERROR",
            ApiError::Common(_) => "COMMON_ERROR",
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.code();
        let message = match &self {
            ApiError::BadRequest(msg) | ApiError::PayloadTooLarge(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_mapping() {
        let err: ApiError = ValidationError::TooLarge { size: 10, limit: 5 }.into();
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err: ApiError = ValidationError::UnsupportedType.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_fusion_error_is_internal() {
        let err: ApiError = FusionError::InvalidScore {
            service_id: "a".to_string(),
            label: "A".to_string(),
            score: f64::NAN,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
