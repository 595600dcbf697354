//! Quota Store
//!
//! Storage abstraction for consumption records plus the in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::error::QuotaError;
use super::window::{ConsumeOutcome, WindowPolicy};

/// Backing store for per-identity consumption records
///
/// Implementations must make [`QuotaStore::consume`] atomic per identity:
/// the records read for evaluation are the records the append is based on.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Records for `identity` within `[since, until]`, oldest first
    ///
    /// Must not modify stored state.
    async fn records(
        &self,
        identity: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, QuotaError>;

    /// Evaluate `policy` at `now` and append a record when it fits
    async fn consume(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        policy: &WindowPolicy,
    ) -> Result<ConsumeOutcome, QuotaError>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

type Records = Arc<Mutex<VecDeque<DateTime<Utc>>>>;

/// In-memory quota store
///
/// The outer map lock is only held to find or create an identity's slot;
/// evaluation runs under that identity's own mutex.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    identities: Arc<RwLock<HashMap<String, Records>>>,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, identity: &str) -> Option<Records> {
        self.identities.read().await.get(identity).cloned()
    }

    async fn slot_or_create(&self, identity: &str) -> Records {
        if let Some(slot) = self.slot(identity).await {
            return slot;
        }

        let mut identities = self.identities.write().await;
        identities
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    /// Number of identities seen so far
    pub async fn identity_count(&self) -> usize {
        self.identities.read().await.len()
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn records(
        &self,
        identity: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, QuotaError> {
        let Some(slot) = self.slot(identity).await else {
            return Ok(Vec::new());
        };

        let records = slot.lock().await;
        Ok(records
            .iter()
            .filter(|at| **at >= since && **at <= until)
            .copied()
            .collect())
    }

    async fn consume(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        policy: &WindowPolicy,
    ) -> Result<ConsumeOutcome, QuotaError> {
        let slot = self.slot_or_create(identity).await;
        let mut records = slot.lock().await;
        Ok(policy.admit(&mut records, now))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
