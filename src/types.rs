// Error types shared by the HTTP handlers

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::storage::StorageError;

pub const MISSING_FILE_MESSAGE: &str = "No file uploaded.";
pub const FILE_NOT_FOUND_MESSAGE: &str = "File not found or has expired.";
pub const NOT_FOUND_MESSAGE: &str = "Not found.";
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred.";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("upload did not contain a file field")]
    MissingFile,

    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("file not found or expired: {0}")]
    FileNotFound(String),

    #[error("no route for request")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::MissingFile => (StatusCode::BAD_REQUEST, MISSING_FILE_MESSAGE).into_response(),
            AppError::Multipart(err) => {
                warn!(error = %err, "Rejected malformed upload");
                (err.status(), err.body_text()).into_response()
            }
            AppError::FileNotFound(_) => (StatusCode::NOT_FOUND, FILE_NOT_FOUND_MESSAGE).into_response(),
            AppError::NotFound => (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE).into_response(),
            AppError::Storage(_) | AppError::Internal(_) => {
                error!(error = %self, "Request failed");
                internal_error_response()
            }
        }
    }
}

/// Generic 500 response; internal details never reach the client.
pub fn internal_error_response() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE).into_response()
}
