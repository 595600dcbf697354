//! Quota Tracker
//!
//! Entry point used by request handlers. Validates the identity, delegates
//! storage to a [`QuotaStore`], and applies one [`WindowPolicy`] to both the
//! read-only `check` and the mutating `consume`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, trace};

use super::config::{QuotaConfig, StoreKind};
use super::error::QuotaError;
use super::sqlite::SqliteStore;
use super::store::{MemoryStore, QuotaStore};
use super::window::{ConsumeOutcome, Decision, WindowPolicy};
use crate::metrics;

/// Per-identity sliding-window quota tracker
#[derive(Clone)]
pub struct QuotaTracker {
    policy: WindowPolicy,
    store: Arc<dyn QuotaStore>,
}

impl std::fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("policy", &self.policy)
            .field("backend", &self.store.backend())
            .finish()
    }
}

impl QuotaTracker {
    /// Create a tracker over an existing store
    pub fn new(policy: WindowPolicy, store: Arc<dyn QuotaStore>) -> Self {
        Self { policy, store }
    }

    /// Create a tracker with an in-memory store
    pub fn in_memory(policy: WindowPolicy) -> Self {
        Self::new(policy, Arc::new(MemoryStore::new()))
    }

    /// Build the tracker and its backing store from configuration
    pub async fn from_config(config: &QuotaConfig) -> Result<Self, QuotaError> {
        let policy = WindowPolicy::new(config.max_events, config.window());

        let store: Arc<dyn QuotaStore> = match config.store {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::Sqlite => {
                let url = config.database_url.as_deref().ok_or_else(|| {
                    QuotaError::BackingStoreUnavailable(
                        "sqlite store requires a database_url".to_string(),
                    )
                })?;
                Arc::new(SqliteStore::connect(url, config.max_connections).await?)
            }
        };

        info!(
            backend = store.backend(),
            max_events = config.max_events,
            window_secs = config.window_secs,
            "Quota tracker ready"
        );

        Ok(Self::new(policy, store))
    }

    /// The window policy applied to every identity
    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Report whether `identity` may consume one unit at `now`
    ///
    /// Never modifies stored state.
    pub async fn check(&self, identity: &str, now: DateTime<Utc>) -> Result<Decision, QuotaError> {
        validate_identity(identity)?;

        let records = self
            .store
            .records(identity, self.policy.cutoff(now), now)
            .await
            .map_err(|e| self.store_failure("check", e))?;

        let decision = self.policy.evaluate(&records, now);

        let outcome = if decision.is_allowed() { "allowed" } else { "denied" };
        metrics::QUOTA_DECISIONS_TOTAL
            .with_label_values(&["check", outcome])
            .inc();
        debug!(?decision, "Quota check");
        trace!(identity, "Quota check identity");

        Ok(decision)
    }

    /// Record one consumption for `identity` at `now` if the window has room
    pub async fn consume(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, QuotaError> {
        validate_identity(identity)?;

        let outcome = self
            .store
            .consume(identity, now, &self.policy)
            .await
            .map_err(|e| self.store_failure("consume", e))?;

        match outcome {
            ConsumeOutcome::Consumed { remaining } => {
                metrics::QUOTA_DECISIONS_TOTAL
                    .with_label_values(&["consume", "consumed"])
                    .inc();
                debug!(remaining, "Quota consumed");
            }
            ConsumeOutcome::Rejected { wait_minutes } => {
                metrics::QUOTA_DECISIONS_TOTAL
                    .with_label_values(&["consume", "rejected"])
                    .inc();
                info!(wait_minutes, "Quota exhausted");
            }
        }

        trace!(identity, "Quota consume identity");

        Ok(outcome)
    }

    fn store_failure(&self, operation: &str, err: QuotaError) -> QuotaError {
        if let QuotaError::BackingStoreUnavailable(reason) = &err {
            metrics::QUOTA_STORE_ERRORS_TOTAL.inc();
            error!(
                backend = self.store.backend(),
                operation,
                reason = %reason,
                "Quota store failure"
            );
        }
        err
    }
}

fn validate_identity(identity: &str) -> Result<(), QuotaError> {
    if identity.trim().is_empty() {
        return Err(QuotaError::InvalidIdentity);
    }
    Ok(())
}
