//! Error types for compress3
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` so handlers can return it directly.
//! Every error body has the shape `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::compress::ALLOWED_EXTENSIONS;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// No multipart field named `file` (400)
    #[error("No file part")]
    MissingFile,

    /// The `file` field carried an empty filename (400)
    #[error("No file selected for uploading")]
    EmptyFilename,

    /// Extension outside the allowed set (400)
    #[error("Allowed file types are - {}", ALLOWED_EXTENSIONS.join(", "))]
    DisallowedExtension,

    /// Malformed request (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request body over the configured limit (413)
    #[error("File too large: exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// Input could not be decoded as an image or PDF (500)
    #[error("Failed to decode input: {0}")]
    Decode(String),

    /// Working image could not be re-encoded (500)
    #[error("Failed to encode output: {0}")]
    Encode(String),

    /// Object store rejected an upload (502)
    #[error("Storage upload failed: {0}")]
    StorageUpload(String),

    /// Local filesystem error (500)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// HTTP status and metric label for this error
    pub fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::MissingFile => (StatusCode::BAD_REQUEST, "missing_file"),
            AppError::EmptyFilename => (StatusCode::BAD_REQUEST, "empty_filename"),
            AppError::DisallowedExtension => (StatusCode::BAD_REQUEST, "disallowed_extension"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            AppError::Decode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "decode"),
            AppError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode"),
            AppError::StorageUpload(_) => (StatusCode::BAD_GATEWAY, "storage_upload"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_type) = self.status_and_kind();

        // Filesystem and join errors may leak local paths; keep them in logs only.
        let error_message = match &self {
            AppError::Io(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Validation(msg) => msg.clone(),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
        } else {
            tracing::debug!(error = %self, error_type, "Request rejected");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
