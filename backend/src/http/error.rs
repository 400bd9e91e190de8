//! HTTP error handling and response types.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::services::{GenerationDiagnostics, PipelineError, TimetableError};
use crate::snapshot::SnapshotError;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (generator stderr for failed runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Generator exit code, when it ran to completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Generator standard output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            exit_code: None,
            stdout: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: GenerationDiagnostics) -> Self {
        self.exit_code = diagnostics.exit_code;
        if !diagnostics.stderr.is_empty() {
            self.details = Some(diagnostics.stderr);
        }
        if !diagnostics.stdout.is_empty() {
            self.stdout = Some(diagnostics.stdout);
        }
        self
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Resource not found
    NotFound(String),
    /// Invalid request (missing or malformed upload)
    BadRequest(String),
    /// Generation request pipeline failure
    Pipeline(PipelineError),
    /// Internal server error
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
            }
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("INTERNAL_ERROR", msg),
            ),
            AppError::Pipeline(e) => {
                let msg = e.to_string();
                match e {
                    PipelineError::BadRequest(_) => {
                        (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
                    }
                    PipelineError::Busy { .. } => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ApiError::new("GENERATOR_BUSY", msg),
                    ),
                    PipelineError::Launch(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiError::new("LAUNCH_FAILURE", msg),
                    ),
                    PipelineError::Supervision(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiError::new("SUPERVISION_FAILURE", msg),
                    ),
                    PipelineError::Timeout { diagnostics, .. } => (
                        StatusCode::GATEWAY_TIMEOUT,
                        ApiError::new("GENERATION_TIMEOUT", msg).with_diagnostics(diagnostics),
                    ),
                    PipelineError::GenerationFailed { diagnostics, .. } => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiError::new("GENERATION_FAILED", msg).with_diagnostics(diagnostics),
                    ),
                    PipelineError::Io(_) | PipelineError::Internal(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiError::new("INTERNAL_ERROR", msg),
                    ),
                }
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl From<SnapshotError> for AppError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::NotFound => AppError::NotFound(err.to_string()),
            SnapshotError::Io(e) => AppError::Internal(format!("Snapshot I/O failed: {}", e)),
        }
    }
}

impl From<TimetableError> for AppError {
    fn from(err: TimetableError) -> Self {
        match err {
            TimetableError::BadRequest(msg) => AppError::BadRequest(msg),
            TimetableError::Snapshot(e) => e.into(),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(format!("Invalid multipart upload: {}", err.body_text()))
    }
}

impl From<MultipartRejection> for AppError {
    fn from(err: MultipartRejection) -> Self {
        AppError::BadRequest(format!("Expected a multipart upload: {}", err.body_text()))
    }
}
