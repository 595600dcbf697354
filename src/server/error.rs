//! HTTP error mapping

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::auth::AuthError;
use crate::document::RenderError;
use crate::metrics;
use crate::quota::QuotaError;

/// Errors returned by request handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Identity is at its limit for the current window
    #[error("Download limit reached, try again in {wait_minutes} minutes")]
    QuotaExhausted { wait_minutes: u64 },

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// Blocking task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(err) => {
                metrics::AUTH_FAILURES_TOTAL
                    .with_label_values(&[err.reason()])
                    .inc();
                warn!(reason = err.reason(), "Authentication failed");

                let status = match err {
                    AuthError::MissingCredential | AuthError::InvalidCredential(_) => {
                        StatusCode::UNAUTHORIZED
                    }
                    AuthError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
                };
                let message = match err {
                    AuthError::MissingCredential => "Sign in required",
                    AuthError::InvalidCredential(_) => "Invalid credential",
                    AuthError::ProviderUnavailable(_) => "Identity provider unavailable",
                };
                (status, Json(json!({ "error": message }))).into_response()
            }
            ApiError::QuotaExhausted { wait_minutes } => {
                let retry_after = (wait_minutes * 60).to_string();
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after)],
                    Json(json!({
                        "error": "Download limit reached",
                        "wait_minutes": wait_minutes,
                    })),
                )
                    .into_response()
            }
            ApiError::Quota(QuotaError::InvalidIdentity) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credential" })),
            )
                .into_response(),
            // Store details are logged by the tracker, never returned
            ApiError::Quota(QuotaError::BackingStoreUnavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Service temporarily unavailable, please try again" })),
            )
                .into_response(),
            ApiError::Render(_) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Document generation failed" })),
            )
                .into_response(),
        }
    }
}
