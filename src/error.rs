use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::OnceLock;
use tracing::error;

use crate::config::Environment;

static REPORTING: OnceLock<Environment> = OnceLock::new();

/// Fixes the error-detail mode for the lifetime of the process. Until it is
/// called, responses behave as if in production (no internals leak).
pub fn init_reporting(environment: Environment) {
    let _ = REPORTING.set(environment);
}

fn detail_enabled() -> bool {
    matches!(REPORTING.get(), Some(Environment::Development))
}

/// One offending field in a multi-field validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// Every failure the API can report, matched exhaustively when building the
/// response envelope. Handlers and repos return these; nothing else decides
/// status codes or body shapes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid input data")]
    ValidationFields(Vec<FieldError>),
    #[error("There is a record associated to {0}")]
    Duplicate(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::ValidationFields(_) | ApiError::Duplicate(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(anyhow::Error::new(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // "fail" for caller mistakes, "error" for our own
        let label = if status.is_server_error() { "error" } else { "fail" };
        let body = match &self {
            ApiError::ValidationFields(fields) => json!({
                "status": label,
                "message": "Invalid input data",
                "data": fields,
            }),
            ApiError::Internal(err) => {
                error!(error = %err, "unhandled internal error");
                let message = if detail_enabled() {
                    format!("{err:#}")
                } else {
                    "Something went wrong. Please try again later.".to_string()
                };
                json!({ "status": label, "message": message })
            }
            other => json!({ "status": label, "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
