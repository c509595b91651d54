//! Server error types with HTTP status code mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use echomap_spatial::AnalysisError;
use serde::Serialize;
use thiserror::Error;

/// Server error wrapping core analysis errors and boundary-only failures.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Core analysis error.
    #[error("{0}")]
    Analysis(#[from] AnalysisError),

    /// The catalog document is not present on disk.
    #[error("catalog file not found: {0}")]
    CatalogNotFound(String),

    /// The catalog document is present but unreadable.
    #[error("catalog file unreadable: {0}")]
    CatalogUnreadable(String),
}

impl ServerError {
    /// Map error to HTTP status code.
    ///
    /// Rejected parameters are the client's fault; everything touching the
    /// base layer or geometry pipeline is a server-side failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Analysis(AnalysisError::InvalidParameter(_)) => StatusCode::BAD_REQUEST,
            ServerError::Analysis(AnalysisError::DataSource { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Analysis(AnalysisError::Processing { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::CatalogNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::CatalogUnreadable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
            status: status.as_u16(),
        };
        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            format!(r#"{{"error":"{}","status":{}}}"#, self, status.as_u16())
        });
        (status, [("content-type", "application/json")], json).into_response()
    }
}

/// Result type alias for handler operations.
pub type Result<T> = std::result::Result<T, ServerError>;
