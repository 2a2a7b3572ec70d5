//! HTTP error mapping.
//!
//! Client mistakes get a short explanation. Capture, crop and storage
//! failures render a generic body; the cause only goes to the log.

use crate::autocrop::CropError;
use crate::capture::CameraError;
use crate::preview::PreviewError;
use crate::session::SessionError;
use crate::storage::StorageError;
use crate::tiff::TiffError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    /// The server stopped with an error.
    #[error("server error: {0}")]
    Server(String),
}

/// A failed request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No valid session; answered with 401.
    #[error("not signed in: {0}")]
    Unauthorized(#[from] SessionError),
    /// The named resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The request parameters are invalid.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// No camera stream is running.
    #[error("camera stream is not running")]
    StreamUnavailable,
    /// Camera failure.
    #[error(transparent)]
    Camera(#[from] CameraError),
    /// Crop failure.
    #[error(transparent)]
    Crop(#[from] CropError),
    /// TIFF encoding failure.
    #[error(transparent)]
    Tiff(#[from] TiffError),
    /// JPEG encoding failure.
    #[error(transparent)]
    Preview(#[from] PreviewError),
    /// Remote storage or cache failure.
    #[error(transparent)]
    Storage(StorageError),
    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => ApiError::NotFound(what),
            StorageError::InvalidName(name) => {
                ApiError::BadRequest(format!("invalid name: {}", name))
            }
            other => ApiError::Storage(other),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Task(e.to_string())
    }
}

impl ApiError {
    /// HTTP status this error is answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::StreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Unauthorized(_) => {
                tracing::debug!("Rejected request: {}", self);
                "Unauthorized".to_string()
            }
            ApiError::NotFound(_) | ApiError::BadRequest(_) => self.to_string(),
            ApiError::StreamUnavailable => {
                tracing::warn!("Request needs the camera stream, which is not running");
                self.to_string()
            }
            _ => {
                tracing::error!("Request failed: {}", self);
                "Internal Error".to_string()
            }
        };
        (status, body).into_response()
    }
}
