use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Result type for admission gateway operations
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Admission gateway error types
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Proxy error: {0}")]
    Proxy(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdmissionError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdmissionError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AdmissionError::NotFound(_) => StatusCode::NOT_FOUND,
            AdmissionError::Proxy(_) => StatusCode::BAD_GATEWAY,
            AdmissionError::Backend(_) => StatusCode::BAD_GATEWAY,
            AdmissionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AdmissionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AdmissionError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code used in the JSON envelope
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::Config(_) => "CONFIG_ERROR",
            AdmissionError::NotFound(_) => "NOT_FOUND",
            AdmissionError::Proxy(_) | AdmissionError::Backend(_) => "BAD_GATEWAY",
            AdmissionError::Timeout(_) => "GATEWAY_TIMEOUT",
            AdmissionError::Internal(_) | AdmissionError::Io(_) => "INTERNAL_ERROR",
        }
    }
}

/// Build the JSON error envelope shared by every error response.
///
/// `details` and `request_id` are omitted from the body when absent.
pub fn error_body(
    code: &str,
    message: &str,
    details: Option<Value>,
    request_id: Option<&str>,
) -> Value {
    let mut error = json!({
        "code": code,
        "message": message,
    });

    if let Some(details) = details {
        error["details"] = details;
    }
    if let Some(request_id) = request_id {
        error["requestId"] = Value::String(request_id.to_string());
    }

    json!({
        "success": false,
        "error": error,
    })
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(error_body(self.code(), &self.to_string(), None, None));

        (status, body).into_response()
    }
}
