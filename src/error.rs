//! Request-level error taxonomy.
//!
//! Only problems with the request itself or with the server's own plumbing
//! are errors here. Whatever the external tool does (non-zero exit, failing to
//! start, hanging until killed) is ordinary response data and lives in
//! [`ExecutionResult`](crate::runner::ExecutionResult) instead.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaygroundError {
    /// The request body is not a valid submission.
    #[error("{0}")]
    Decode(String),

    /// The submitted source exceeds the configured cap.
    #[error("source is {len} bytes, limit is {limit} bytes")]
    SourceTooLarge { len: usize, limit: usize },

    /// Staging the submission on disk failed.
    #[error("failed to stage source: {0}")]
    Io(String),

    /// The configured tool could not be found or is not executable.
    #[error("tool not available at {}: {reason}", .path.display())]
    ToolUnavailable { path: PathBuf, reason: String },
}

impl PlaygroundError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::SourceTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Io(_) | Self::ToolUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for PlaygroundError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl IntoResponse for PlaygroundError {
    fn into_response(self) -> Response {
        // A local tool: the full message is more useful than a generic one.
        (self.status_code(), self.to_string()).into_response()
    }
}
