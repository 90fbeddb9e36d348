use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failure taxonomy for calls against the SEMS portal.
///
/// `Auth` and `UnexpectedStatus` are terminal for the cycle that hit them;
/// `Transient` is worth retrying with backoff.
#[derive(Debug, Error)]
pub enum SemsError {
    /// Credentials rejected, or the portal still signals an expired session
    /// after the one guarded re-auth retry.
    #[error("upstream authorization failed: {0}")]
    Auth(String),

    /// Timeout, connection failure, HTTP 429 or 5xx.
    #[error("transient upstream error: {0}")]
    Transient(String),

    /// Any other non-2xx status. Retrying the same request will not help.
    #[error("unexpected upstream status {0}")]
    UnexpectedStatus(StatusCode),

    /// Body was not parseable where JSON was required.
    #[error("malformed upstream payload: {0}")]
    Malformed(String),
}

impl SemsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SemsError::Transient(_))
    }
}

impl From<reqwest::Error> for SemsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            SemsError::Transient(e.to_string())
        } else {
            SemsError::Malformed(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Sems(#[from] SemsError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match &self {
            AppError::Sems(e) => (
                StatusCode::BAD_GATEWAY,
                "upstream_failed",
                e.to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
