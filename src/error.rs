//! Request-facing error taxonomy.
//!
//! Validation failures (bad input, bad repository, nothing to ingest, unknown
//! session) are reported to the caller verbatim with a 400. Everything else is
//! logged in full and surfaced as a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

const GENERIC_ERROR: &str = "An unexpected error occurred. Please try again.";

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid input, unusable repository.
    #[error("{0}")]
    Validation(String),

    /// No repository has been loaded for the session key.
    #[error("Repository not loaded. Please load a repository first.")]
    NotLoaded,

    /// The vector index returned nothing for this session.
    #[error("No relevant information found in the repository")]
    NoRelevantContext,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::NotLoaded | AppError::NoRelevantContext => {
                StatusCode::BAD_REQUEST
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => GENERIC_ERROR.to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(e) => tracing::error!("Unexpected error: {e:#}"),
            other => tracing::warn!("Validation error: {other}"),
        }
        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
