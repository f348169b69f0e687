use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::io;
use thiserror::Error;

/// Failure of a storage collaborator (database or file system).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Every way a media request can terminate without a file being served.
///
/// The status each variant maps to is part of the public contract.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid request type of {0}")]
    InvalidAccessType(String),
    #[error("Media not found.")]
    ResourceNotFound,
    #[error("Authentication required.")]
    AuthenticationRequired,
    #[error("Unauthorized Access.")]
    AccessDenied,
    #[error("Invalid signature.")]
    InvalidSignature,
    #[error("Expired signature.")]
    ExpiredSignature,
    #[error("Media file not found.")]
    FileMissing,
    #[error("Media file could not be opened.")]
    StreamOpenFailure(#[source] io::Error),
    #[error("Internal server error.")]
    Backend(#[from] StoreError),
}

impl MediaError {
    pub fn status(&self) -> StatusCode {
        match self {
            MediaError::InvalidAccessType(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MediaError::ResourceNotFound | MediaError::FileMissing => StatusCode::NOT_FOUND,
            MediaError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            MediaError::AccessDenied
            | MediaError::InvalidSignature
            | MediaError::ExpiredSignature => StatusCode::FORBIDDEN,
            MediaError::StreamOpenFailure(_) | MediaError::Backend(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            // The body stays generic; the cause only goes to the log.
            tracing::error!(error = ?self, "media request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
