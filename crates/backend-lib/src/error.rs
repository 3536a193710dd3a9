// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context.
///
/// An offline delivery target is deliberately not represented here: a
/// delivery miss is a silent skip, never an error surfaced to anyone.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Meeting provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Persistence(_) | AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VAL_001",
            AppError::Persistence(_) => "STORE_001",
            AppError::Provider(_) => "PROVIDER_001",
            AppError::Internal(_) => "INT_001",
            AppError::NotFound(_) => "NF_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Validation(_) => "Invalid input provided".to_string(),
            AppError::Persistence(_) => "Failed to store the message".to_string(),
            AppError::Provider(_) => "Meeting provider is unavailable".to_string(),
            AppError::Internal(_) | AppError::Io(_) => "Internal server error".to_string(),
            AppError::NotFound(_) => "Resource not found".to_string(),
            AppError::Json(_) => "Invalid request format".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::Internal("Failed to send message".to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AppError::Persistence("Operation timed out".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_app_error_display() {
        let validation = AppError::Validation("sender is required".to_string());
        assert_eq!(
            validation.to_string(),
            "Validation error: sender is required"
        );

        let persistence = AppError::Persistence("connection refused".to_string());
        assert!(persistence.to_string().contains("Persistence error"));
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::Validation("empty body".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Persistence("store down".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Provider("zoom 503".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::NotFound("message".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Internal("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_app_error_error_codes() {
        assert_eq!(
            AppError::Validation("test".to_string()).error_code(),
            "VAL_001"
        );
        assert_eq!(
            AppError::Persistence("test".to_string()).error_code(),
            "STORE_001"
        );
        assert_eq!(
            AppError::Provider("test".to_string()).error_code(),
            "PROVIDER_001"
        );
        assert_eq!(
            AppError::Internal("test".to_string()).error_code(),
            "INT_001"
        );
    }

    #[tokio::test]
    async fn test_timeout_maps_to_persistence_failure() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            tokio::time::sleep(std::time::Duration::from_secs(5)),
        )
        .await
        .unwrap_err();
        let err: AppError = elapsed.into();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[test]
    fn test_app_error_into_response() {
        let error = AppError::Validation("receiver is required".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response_headers = response.headers();
        assert!(response_headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("application/json"));
    }
}
