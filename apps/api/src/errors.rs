use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::generation::resilient::GenerationUnavailable;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// No live or previously generated result exists. The client should offer manual entry.
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<GenerationUnavailable> for AppError {
    fn from(err: GenerationUnavailable) -> Self {
        AppError::GenerationUnavailable(err.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::RateLimitExceeded { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Too many requests. Try again in {retry_after_secs} seconds."),
            ),
            AppError::GenerationUnavailable(msg) => {
                tracing::warn!("Generation unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "GENERATION_UNAVAILABLE",
                    msg.clone(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        match &self {
            AppError::RateLimitExceeded { retry_after_secs } => {
                error["retry_after_secs"] = json!(retry_after_secs);
            }
            AppError::GenerationUnavailable(_) => {
                error["manual_entry"] = json!(true);
            }
            _ => {}
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();

        if let AppError::RateLimitExceeded { retry_after_secs } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs),
            );
        }

        response
    }
}
