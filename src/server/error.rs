//! HTTP error responses.
//!
//! Every failure leaves the service as
//! `{"detail": "...", "kind": "...", "stage": "..."}` with a status derived
//! from the error kind. `stage` is `null` for request-level problems that
//! happened before any document entered the pipeline.

use crate::error::{DocumentError, Stage};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub kind: String,
    pub stage: Option<Stage>,
}

/// An error returned from a handler.
#[derive(Debug, Clone)]
#[must_use = "errors do nothing unless turned into a response"]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn request(status: StatusCode, kind: &str, detail: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                detail: detail.into(),
                kind: kind.to_string(),
                stage: None,
            },
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::request(StatusCode::BAD_REQUEST, "bad_request", detail)
    }

    pub fn invalid_query(detail: impl Into<String>) -> Self {
        Self::request(StatusCode::BAD_REQUEST, "invalid_query", detail)
    }

    pub fn no_files() -> Self {
        Self::request(
            StatusCode::BAD_REQUEST,
            "no_files",
            "No files provided in multipart request",
        )
    }

    pub fn payload_too_large(limit_bytes: usize) -> Self {
        Self::request(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            format!("Upload exceeds the limit of {} MB", limit_bytes / (1024 * 1024)),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

/// Status for a per-document failure surfaced by a single-document endpoint.
pub fn status_for(error: &DocumentError) -> StatusCode {
    match error {
        DocumentError::Decode { .. } => StatusCode::BAD_REQUEST,
        DocumentError::PdfUnavailable { .. } | DocumentError::Recognition { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        DocumentError::ExtractionTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DocumentError::ExtractionFailed { .. } | DocumentError::ExtractionParse { .. } => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl From<DocumentError> for ApiError {
    fn from(error: DocumentError) -> Self {
        Self {
            status: status_for(&error),
            body: ErrorBody {
                detail: error.to_string(),
                kind: error.kind().to_string(),
                stage: Some(error.stage()),
            },
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        match rejection {
            MultipartRejection::InvalidBoundary(_) => Self::bad_request(
                "Invalid multipart boundary: send the request as multipart/form-data",
            ),
            other => Self::bad_request(format!("Invalid multipart request: {other}")),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid_query(rejection.body_text())
    }
}

/// Map a field read error, keeping the body-limit case distinct.
pub(crate) fn from_multipart_error(error: MultipartError, limit_bytes: usize) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(limit_bytes)
    } else {
        ApiError::bad_request(format!("Failed to parse multipart form: {}", error.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
