use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::orchestrator::JobError;

/// Errors returned by the HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    PaymentRequired { remaining: i64, required: i64 },
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(msg) => error_body(StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, msg),
            ApiError::PaymentRequired { remaining, required } => (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "error": "Insufficient credits",
                    "remaining": remaining,
                    "required": required,
                })),
            )
                .into_response(),
            ApiError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => error_body(StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::EmptyEmailList
            | JobError::TooManyEmails { .. }
            | JobError::InvalidPage(_) => ApiError::BadRequest(err.to_string()),
            JobError::InsufficientCredits {
                remaining,
                required,
            } => ApiError::PaymentRequired {
                remaining,
                required,
            },
            JobError::NotFound => ApiError::NotFound(err.to_string()),
            JobError::NotCompleted { .. } => ApiError::Conflict(err.to_string()),
            JobError::Store(_) | JobError::Ledger(_) | JobError::Queue(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        ApiError::BadRequest(report.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
