//! API error handling
//!
//! Every handler failure converges on [`ApiError`], which maps to a status
//! code and a `{ "error", "code" }` JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::engine::EngineError;
use crate::ingest::IngestError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing upload, bad extension, missing or invalid form fields.
    #[error("{0}")]
    Validation(String),

    /// The decoder could not parse the uploaded bytes.
    #[error("{0}")]
    ImageLoad(String),

    #[error("No faces detected in the image")]
    NoFaceDetected,

    #[error("No match found")]
    NoMatch,

    /// Extractor, store or I/O failure. The detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::ImageLoad(_) | Self::NoFaceDetected => {
                StatusCode::BAD_REQUEST
            }
            Self::NoMatch => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "INVALID_INPUT",
            Self::ImageLoad(_) => "IMAGE_DECODE_FAILED",
            Self::NoFaceDetected => "NO_FACE_DETECTED",
            Self::NoMatch => "NO_MATCH",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Decode(e) => Self::ImageLoad(format!("Failed to load image: {e}")),
            IngestError::Io(e) => Self::Internal(format!("upload persistence: {e}")),
            IngestError::DecodeTaskFailed(e) => Self::Internal(format!("decode task: {e}")),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        match &self {
            Self::Internal(detail) => {
                tracing::error!(status = %status, code, error = %detail, "server error");
            }
            Self::NoMatch => {
                tracing::info!(status = %status, code, "no match");
            }
            _ => {
                tracing::warn!(status = %status, code, error = %self, "client error");
            }
        }

        let body = serde_json::json!({
            "error": self.client_message(),
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
