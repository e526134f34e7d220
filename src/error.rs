//! Error handling for detector-hub

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Persisted config document missing or corrupt
    #[error("Config unreadable: {0}")]
    ConfigUnreadable(String),

    /// A single detector worker could not be spawned
    #[error("Worker start failed for detector {detector}: {message}")]
    WorkerStartFailed { detector: String, message: String },

    /// Video source could not be opened or captured
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// External detector service error
    #[error("Detector service error: {0}")]
    DetectorService(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML rendering error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::ConfigUnreadable(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_UNREADABLE",
                msg.clone(),
            ),
            Error::WorkerStartFailed { detector, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "WORKER_START_FAILED",
                format!("Detector {}: {}", detector, message),
            ),
            Error::SourceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SOURCE_UNAVAILABLE",
                msg.clone(),
            ),
            Error::DetectorService(msg) => (
                StatusCode::BAD_GATEWAY,
                "DETECTOR_SERVICE_ERROR",
                msg.clone(),
            ),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Yaml(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", e.to_string()),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
