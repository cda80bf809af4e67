//! Service error type shared by the aggregation engine and the HTTP routes.
//!
//! Caller-input problems and data-source failures are kept apart so the
//! route layer can answer `400` for the former and a retryable `503` for
//! the latter.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("requested resolution too coarse: no latitude cell height exceeds {raw_y}")]
    ResolutionTooCoarse { raw_y: f64 },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("data source error: {0}")]
    DataSource(#[from] sqlx::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Only infrastructure failures are worth retrying; caller errors will
    /// fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DataSource(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } | Self::ResolutionTooCoarse { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::DataSource(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        // ---
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}
