//! HTTP Delivery Layer
//!
//! Serves the landing page, the quota status and the quota-gated PDF download.
//!
//! # Routes
//!
//! - `GET /` landing page
//! - `GET /api/status` quota status, never spends quota
//! - `GET /api/download` spends one unit, then returns a fresh document
//! - `GET /health` liveness
//! - `GET /metrics` Prometheus exposition (when enabled)
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────┐    ┌────────────────┐
//! │   request    │───▶│ IdentityVerifier │───▶│  QuotaTracker  │
//! │ (cookie/JWT) │    │  credential→id   │    │ check/consume  │
//! └──────────────┘    └──────────────────┘    └───────┬────────┘
//!                                                     │ consumed
//!                                             ┌───────▼────────┐
//!                                             │DocumentRenderer│
//!                                             │ (blocking pool)│
//!                                             └────────────────┘
//! ```

pub mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::StatusResponse;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{GoogleTokenVerifier, IdentityVerifier, StaticTokenVerifier};
use crate::config::{AuthProvider, Config};
use crate::document::{DocumentRenderer, FillerRenderer};
use crate::metrics;
use crate::quota::QuotaTracker;

const PAGE_TEMPLATE: &str = include_str!("page.html");
const CLIENT_ID_PLACEHOLDER: &str = "{{GOOGLE_CLIENT_ID}}";

/// Shared handler state
pub struct AppState {
    pub tracker: QuotaTracker,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub renderer: Arc<dyn DocumentRenderer>,
    /// Expose `/metrics` on this server
    pub metrics_enabled: bool,
    page: String,
}

impl AppState {
    pub fn new(
        tracker: QuotaTracker,
        verifier: Arc<dyn IdentityVerifier>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        Self {
            tracker,
            verifier,
            renderer,
            metrics_enabled: false,
            page: landing_page(None),
        }
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Enable Google Sign-In on the landing page
    pub fn with_google_client_id(mut self, client_id: &str) -> Self {
        self.page = landing_page(Some(client_id));
        self
    }

    /// Build all runtime components from configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        let tracker = QuotaTracker::from_config(&config.quota)
            .await
            .context("Failed to initialize quota store")?;

        let renderer = FillerRenderer::new(config.document.clone())
            .context("Invalid document configuration")?;

        let state = match config.auth.provider {
            AuthProvider::Static => {
                let verifier = StaticTokenVerifier::new(config.auth.tokens.clone());
                info!(tokens = verifier.len(), "Using static token verifier");
                Self::new(tracker, Arc::new(verifier), Arc::new(renderer))
            }
            AuthProvider::Google => {
                let client_id = config
                    .auth
                    .google_client_id
                    .as_deref()
                    .context("Google auth requires a client id")?;
                let verifier = GoogleTokenVerifier::new(client_id)
                    .context("Failed to build Google token verifier")?;
                info!("Using Google token verifier");
                Self::new(tracker, Arc::new(verifier), Arc::new(renderer))
                    .with_google_client_id(client_id)
            }
        };

        Ok(state.with_metrics(config.metrics.enabled))
    }

    pub fn page(&self) -> &str {
        &self.page
    }
}

fn landing_page(client_id: Option<&str>) -> String {
    // Client ids are `[0-9a-z-]+.apps.googleusercontent.com`; anything else is dropped
    let client_id = client_id
        .filter(|id| {
            id.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        })
        .unwrap_or("");
    PAGE_TEMPLATE.replace(CLIENT_ID_PLACEHOLDER, client_id)
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::index))
        .route("/api/status", get(handlers::status))
        .route("/api/download", get(handlers::download))
        .route("/health", get(handlers::health));

    if state.metrics_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start the HTTP server and run until Ctrl-C
pub async fn serve(config: &Config) -> Result<()> {
    if config.metrics.enabled {
        metrics::init().context("Failed to initialize metrics")?;
    }

    let state = Arc::new(AppState::from_config(config).await?);
    let app = router(state);

    let addr = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Pdfbirch listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
