//! HTTP error mapping.
//!
//! [`AppError`] turns domain failures into the `{code, message}` JSON body
//! that `HttpCompetitionApi` decodes on the client side.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use topout_scoring::api::ErrorBody;
use topout_scoring::RepositoryError;

/// Error returned by request handlers
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    /// Logged for server errors, never sent to the client
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create an error with an explicit status and code
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach an internal cause
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 404 Not Found
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// 409 Conflict
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// 422 Unprocessable Entity
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    /// 503 Service Unavailable
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    /// HTTP status of the response
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code of the response
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => Self::not_found(format!("{what} not found")),
            RepositoryError::Conflict(detail) => Self::conflict(detail),
            RepositoryError::Validation(reason) => Self::validation(reason.to_string()),
            RepositoryError::Unavailable(detail) => {
                Self::unavailable("storage is unavailable").with_source(anyhow::anyhow!(detail))
            },
        }
    }
}

/// Startup failures of the server binary
#[derive(Error, Debug)]
pub enum ServerError {
    /// The fixture file could not be read
    #[error("cannot read fixture {path}: {source}")]
    FixtureRead {
        /// Fixture path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The fixture file is not a valid fixture
    #[error("invalid fixture {path}: {source}")]
    FixtureFormat {
        /// Fixture path
        path: PathBuf,
        /// Parse error
        source: serde_json::Error,
    },
}
