//! Mapping from registry errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use identity_registry::RegistryError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A failed request: HTTP status plus the message sent to the client.
#[derive(Error, Debug)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let status = match &e {
            RegistryError::Encoding(_) | RegistryError::IdentityMismatch(_) => StatusCode::BAD_REQUEST,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::DuplicateSubmission
            | RegistryError::InvalidState { .. }
            | RegistryError::RootMismatch { .. } => StatusCode::CONFLICT,
            RegistryError::LedgerRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RegistryError::Transport(_) | RegistryError::SnapshotStore(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %e, "request failed");
        } else if !e.is_caller_error() {
            warn!(error = %e, "request refused");
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}
