use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ErrorKind;
use crate::services::audit::AuditStoreError;
use crate::services::pipeline::Rejection;

/// Errors returned before a stream is opened, or by the plain JSON endpoints
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let (status, error_detail) = match self {
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new(ErrorKind::Unauthorized.code(), ErrorKind::Unauthorized.default_message())
                    .with_details(msg),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(ErrorKind::ValidationError.code(), msg),
            ),
            AppError::RateLimited { retry_after_secs } => {
                retry_after = Some(retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorDetail::new(ErrorKind::RateLimited.code(), ErrorKind::RateLimited.default_message())
                        .with_details(format!("Retry after {} seconds", retry_after_secs)),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetail::new("STORAGE_ERROR", "Request history is temporarily unavailable."),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Invalid(msg) => AppError::Validation(msg),
            Rejection::RateLimited(decision) => AppError::RateLimited {
                retry_after_secs: decision.retry_after_secs.max(1),
            },
        }
    }
}

impl From<AuditStoreError> for AppError {
    fn from(err: AuditStoreError) -> Self {
        AppError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rate_limiter::RateLimitDecision;

    #[test]
    fn test_error_response_format() {
        let error = AppError::from(AuditStoreError("database is locked".to_string()));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_detail_creation() {
        let detail = ErrorDetail::new("TEST_CODE", "Test message");
        assert_eq!(detail.code, "TEST_CODE");
        assert_eq!(detail.message, "Test message");
        assert!(detail.details.is_none());
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let rejection = Rejection::RateLimited(RateLimitDecision {
            blocked: true,
            remaining: 0,
            reset_time: chrono::Utc::now() + chrono::Duration::seconds(42),
            retry_after_secs: 42,
        });
        let response = AppError::from(rejection).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_unauthorized_and_validation_statuses() {
        assert_eq!(
            AppError::Unauthorized("no identity".into()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(Rejection::Invalid("Question cannot be empty".into()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }
}
