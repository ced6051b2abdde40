//! HTTP error handling and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::repository::RepositoryError;
use crate::services::{ErrorKind, ServiceError};

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
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

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Resource not found
    NotFound(String),
    /// Invalid request (validation error)
    BadRequest(String),
    /// Internal server error
    Internal(String),
    /// Failure reported by the service layer
    Service(ServiceError),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ApiError) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
            }
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("INTERNAL_ERROR", msg),
            ),
            AppError::Service(err) => {
                let (status, code) = match err.kind() {
                    ErrorKind::Format => (StatusCode::UNPROCESSABLE_ENTITY, "FORMAT_ERROR"),
                    ErrorKind::Admissibility => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "NOT_ADMISSIBLE")
                    }
                    ErrorKind::ReferenceIntegrity => (StatusCode::NOT_FOUND, "REFERENCE_MISSING"),
                    ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    ErrorKind::Guard => (StatusCode::NOT_ACCEPTABLE, "IN_USE"),
                    ErrorKind::Validation => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
                    ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
                };
                let mut body = ApiError::new(code, err.to_string());
                if let ServiceError::Repository(repo_err) = &err {
                    if let Some(details) = repo_err.context().details.clone() {
                        body = body.with_details(details);
                    }
                }
                (status, body)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_body();
        (status, Json(error)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        AppError::Service(err)
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AppError::Service(err.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).status_and_body().0
    }

    #[test]
    fn test_service_error_status_mapping() {
        assert_eq!(
            status_of(ServiceError::Admissibility("rejected".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(ServiceError::Guard("in use".into())),
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(
            status_of(ServiceError::ReferenceIntegrity("missing".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(RepositoryError::not_found("calc 1").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ServiceError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
