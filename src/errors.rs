use crate::services::upload_service::UploadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Protocol errors map onto HTTP statuses here: validation failures and
/// unknown upload ids are client errors (400), everything touching disk or
/// the index is a 500.
impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let status = match &err {
            UploadError::ExtensionNotAllowed(_)
            | UploadError::InvalidFilename(_)
            | UploadError::UploadNotFound(_)
            | UploadError::MissingChunk { .. } => StatusCode::BAD_REQUEST,
            UploadError::Io(_) | UploadError::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}
