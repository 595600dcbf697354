//! Route handlers

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::error::ApiError;
use super::AppState;
use crate::auth::{credential_from_headers, AuthError, Identity};
use crate::document::download_filename;
use crate::metrics as prom;
use crate::quota::{ConsumeOutcome, Decision};

/// Body of `GET /api/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub identity: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_minutes: Option<u64>,
    pub remaining: u32,
    pub limit: u32,
    pub window_minutes: u64,
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let credential = credential_from_headers(headers).ok_or(AuthError::MissingCredential)?;
    Ok(state.verifier.resolve(&credential).await?)
}

pub(super) async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.page().to_string())
}

pub(super) async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    let identity = authenticate(&state, &headers).await?;
    let decision = state.tracker.check(identity.as_str(), Utc::now()).await?;

    let policy = state.tracker.policy();
    let remaining = match decision {
        Decision::Allowed { remaining } => remaining,
        Decision::Denied { .. } => 0,
    };

    Ok(Json(StatusResponse {
        identity: identity.to_string(),
        allowed: decision.is_allowed(),
        wait_minutes: decision.wait_minutes(),
        remaining,
        limit: policy.max_events(),
        window_minutes: policy.window().as_secs() / 60,
    }))
}

pub(super) async fn download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = authenticate(&state, &headers).await?;

    // The unit is spent before rendering; a failed render does not refund it
    let remaining = match state.tracker.consume(identity.as_str(), Utc::now()).await? {
        ConsumeOutcome::Consumed { remaining } => remaining,
        ConsumeOutcome::Rejected { wait_minutes } => {
            return Err(ApiError::QuotaExhausted { wait_minutes });
        }
    };

    let renderer = Arc::clone(&state.renderer);
    let bytes = tokio::task::spawn_blocking(move || renderer.render())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| {
            error!(error = %e, "Document rendering failed");
            e
        })?;

    let filename = download_filename();
    info!(%filename, bytes = bytes.len(), remaining, "Serving document");

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
        (header::CACHE_CONTROL, "no-store".to_string()),
    ];
    Ok((headers, bytes).into_response())
}

pub(super) async fn health() -> impl IntoResponse {
    StatusCode::OK
}

pub(super) async fn metrics() -> Response {
    match prom::gather_metrics() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}
