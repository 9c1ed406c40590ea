//! Error types for the `cms_backend` crate.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors raised by a [`ContentStore`](crate::ContentStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object name is not a bare leaf filename.
    #[error("Invalid object name: {0:?}")]
    InvalidName(String),

    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A remote backend (e.g. S3) rejected the operation.
    #[error("Backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Request-level failures. Each variant maps to one HTTP status class.
#[derive(Debug, thiserror::Error)]
pub enum CmsError {
    /// Wrong HTTP verb for the endpoint.
    #[error("{0}")]
    MethodNotAllowed(&'static str),

    /// Missing or invalid parameters, or a failed upload transfer.
    #[error("{0}")]
    BadRequest(String),

    /// The referenced file does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The upload is larger than the configured limit.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// The sniffed MIME type is not on the allow-list.
    #[error("{0}")]
    UnsupportedMediaType(String),

    /// The primary content store failed. `message` is safe to show clients;
    /// `source` is only logged.
    #[error("{message}")]
    Storage {
        message: &'static str,
        #[source]
        source: StoreError,
    },
}

/// A type alias for `Result<T, CmsError>`.
pub type Result<T> = std::result::Result<T, CmsError>;

/// JSON body shared by every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

impl CmsError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CmsError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            CmsError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CmsError::NotFound(_) => StatusCode::NOT_FOUND,
            CmsError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CmsError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CmsError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn storage(message: &'static str, source: impl Into<StoreError>) -> Self {
        CmsError::Storage {
            message,
            source: source.into(),
        }
    }
}

impl IntoResponse for CmsError {
    fn into_response(self) -> Response {
        if let CmsError::Storage { message, source } = &self {
            tracing::error!("{message} ({source})");
        }
        let status = self.status_code();
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}
