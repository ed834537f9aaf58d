//! Application error types.
//!
//! Every failure the collector can surface maps to one of these variants.
//! Missing fields inside a status document are not errors; the extractors
//! default them to zero.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error enumeration.
#[derive(Debug, Error)]
pub enum AppError {
    /// Connecting or authenticating to the data source failed.
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// An administrative stats query failed (e.g. permission denied).
    #[error("query failure: {0}")]
    QueryFailure(String),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Configuration values failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// An upstream service (e.g. the report endpoint) failed.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Requested resource does not exist yet.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ConnectionUnavailable(_) => "CONNECTION_UNAVAILABLE",
            AppError::QueryFailure(_) => "QUERY_FAILURE",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status used when the error reaches a handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ConnectionUnavailable(_) | AppError::ExternalService(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::QueryFailure(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body: ApiResponse<()> = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Configuration(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::ConnectionUnavailable("refused".into()).code(),
            "CONNECTION_UNAVAILABLE"
        );
        assert_eq!(AppError::QueryFailure("denied".into()).code(), "QUERY_FAILURE");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("snapshot".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::ConnectionUnavailable("refused".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
