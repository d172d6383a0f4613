//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core_state::CoreError;
use crate::pipeline::import::ImportError;
use crate::pipeline::processor::ProcessingError;
use crate::pipeline::review::ReviewError;
use crate::pipeline::spreadsheet::SpreadsheetError;
use crate::store::StoreError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Duplicate upload: {0}")]
    DuplicateExact(String),
    #[error("Duplicate filename: {0}")]
    DuplicateName(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),
    #[error("No supporting documents")]
    NoSupportingDocuments,
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::DuplicateExact(_)
            | ApiError::DuplicateName(_)
            | ApiError::NoSupportingDocuments => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::LlmUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing code and message. Internal details are logged, not
    /// returned.
    pub fn detail(&self) -> ErrorDetail {
        let (code, message) = match self {
            ApiError::BadRequest(m) => ("BAD_REQUEST", m.clone()),
            ApiError::NotFound(m) => ("NOT_FOUND", m.clone()),
            ApiError::DuplicateExact(m) => ("DUPLICATE_EXACT", m.clone()),
            ApiError::DuplicateName(m) => ("DUPLICATE_NAME", m.clone()),
            ApiError::PayloadTooLarge(m) => ("PAYLOAD_TOO_LARGE", m.clone()),
            ApiError::UnsupportedMedia(m) => ("UNSUPPORTED_MEDIA", m.clone()),
            ApiError::NoSupportingDocuments => (
                "NO_SUPPORTING_DOCUMENTS",
                "At least one row needs a linked image or PDF supporting document".to_string(),
            ),
            ApiError::LlmUnavailable(m) => ("LLM_UNAVAILABLE", m.clone()),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                ("INTERNAL", "An internal error occurred".to_string())
            }
        };
        ErrorDetail { code, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.detail(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::LockPoisoned => ApiError::Internal("lock poisoned".into()),
            CoreError::LlmUnavailable => ApiError::LlmUnavailable(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateExact { .. } => ApiError::DuplicateExact(err.to_string()),
            StoreError::DuplicateName { .. } => ApiError::DuplicateName(err.to_string()),
            StoreError::GlEntryNotFound(_)
            | StoreError::DocumentNotFound(_)
            | StoreError::DocItemNotFound(_)
            | StoreError::FileMissing(_) => ApiError::NotFound(err.to_string()),
            StoreError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::UnsupportedFormat(_) => ApiError::UnsupportedMedia(err.to_string()),
            ImportError::FileTooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            ImportError::EmptyFile => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<ProcessingError> for ApiError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Import(e) => e.into(),
            ProcessingError::Store(e) => e.into(),
            ProcessingError::LockPoisoned => ApiError::Internal("lock poisoned".into()),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::NoSupportingDocuments => ApiError::NoSupportingDocuments,
            ReviewError::Llm(e) => ApiError::LlmUnavailable(e.to_string()),
            ReviewError::Serialization(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<SpreadsheetError> for ApiError {
    fn from(err: SpreadsheetError) -> Self {
        match err {
            SpreadsheetError::UnsupportedFormat(_) => ApiError::UnsupportedMedia(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}
