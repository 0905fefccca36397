//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use gaesupport_session::SessionError;
use gaesupport_trace::TraceError;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Session store failure.
    #[error("Session store error: {0}")]
    Session(#[from] SessionError),

    /// Tracing backend rejected or failed a submission.
    #[error("Trace backend error: {0}")]
    Trace(#[from] TraceError),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ServerError::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, "session_store_error"),
            ServerError::Trace(_) => (StatusCode::BAD_GATEWAY, "trace_backend_error"),
        };

        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Server error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaesupport_session::EntityError;

    #[test]
    fn test_status_codes() {
        let bad = ServerError::BadRequest("x".to_string()).into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let session = ServerError::from(SessionError::from(EntityError::Unavailable)).into_response();
        assert_eq!(session.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let trace = ServerError::from(TraceError::Api {
            status: 403,
            message: "denied".to_string(),
        })
        .into_response();
        assert_eq!(trace.status(), StatusCode::BAD_GATEWAY);
    }
}
