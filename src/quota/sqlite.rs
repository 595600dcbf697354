//! SQLite Quota Store
//!
//! Persists consumption records in a single indexed table. `consume` runs
//! inside a `BEGIN IMMEDIATE` transaction, which takes the database write
//! lock before reading, so two connections cannot both pass evaluation on
//! the last free slot. The transaction runs on its own task and is held by
//! a `sqlx::Transaction` guard, so a cancelled caller never leaves a
//! connection inside an open transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::QuotaError;
use super::store::QuotaStore;
use super::window::{ConsumeOutcome, Decision, WindowPolicy};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS quota_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL,
    consumed_at INTEGER NOT NULL
)";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_quota_events_identity ON quota_events (identity, consumed_at)";

/// SQLite-backed quota store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` and create the schema if needed
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, QuotaError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database on a single pinned connection
    pub async fn in_memory() -> Result<Self, QuotaError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Use an existing pool, creating the schema if needed
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, QuotaError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_INDEX).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Run one consume inside `BEGIN IMMEDIATE`
    ///
    /// The transaction guard rolls back when dropped before `commit`.
    async fn consume_in_transaction(
        pool: &SqlitePool,
        identity: &str,
        now: DateTime<Utc>,
        policy: &WindowPolicy,
    ) -> Result<ConsumeOutcome, QuotaError> {
        let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;
        let outcome = Self::consume_locked(&mut *tx, identity, now, policy).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn consume_locked(
        conn: &mut SqliteConnection,
        identity: &str,
        now: DateTime<Utc>,
        policy: &WindowPolicy,
    ) -> Result<ConsumeOutcome, QuotaError> {
        let pruned = sqlx::query("DELETE FROM quota_events WHERE identity = ?1 AND consumed_at < ?2")
            .bind(identity)
            .bind(policy.cutoff_millis(now))
            .execute(&mut *conn)
            .await?
            .rows_affected();
        if pruned > 0 {
            debug!(pruned, "Pruned aged-out quota records");
        }

        let stamps: Vec<i64> = sqlx::query_scalar(
            "SELECT consumed_at FROM quota_events WHERE identity = ?1 ORDER BY consumed_at ASC",
        )
        .bind(identity)
        .fetch_all(&mut *conn)
        .await?;

        let records = from_millis(stamps);

        match policy.evaluate(&records, now) {
            Decision::Denied { wait_minutes } => Ok(ConsumeOutcome::Rejected { wait_minutes }),
            Decision::Allowed { remaining } => {
                sqlx::query("INSERT INTO quota_events (identity, consumed_at) VALUES (?1, ?2)")
                    .bind(identity)
                    .bind(now.timestamp_millis())
                    .execute(&mut *conn)
                    .await?;

                Ok(ConsumeOutcome::Consumed {
                    remaining: remaining - 1,
                })
            }
        }
    }
}

#[async_trait]
impl QuotaStore for SqliteStore {
    async fn records(
        &self,
        identity: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, QuotaError> {
        let stamps: Vec<i64> = sqlx::query_scalar(
            "SELECT consumed_at FROM quota_events \
             WHERE identity = ?1 AND consumed_at >= ?2 AND consumed_at <= ?3 \
             ORDER BY consumed_at ASC",
        )
        .bind(identity)
        .bind(since.timestamp_millis())
        .bind(until.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(from_millis(stamps))
    }

    async fn consume(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        policy: &WindowPolicy,
    ) -> Result<ConsumeOutcome, QuotaError> {
        let pool = self.pool.clone();
        let identity = identity.to_string();
        let policy = *policy;

        // Detached so a dropped request future cannot stop between BEGIN and COMMIT
        let task = tokio::spawn(async move {
            Self::consume_in_transaction(&pool, &identity, now, &policy).await
        });

        task.await.map_err(|e| {
            warn!(error = %e, "Quota transaction task failed");
            QuotaError::BackingStoreUnavailable(format!("quota transaction aborted: {}", e))
        })?
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

fn from_millis(stamps: Vec<i64>) -> Vec<DateTime<Utc>> {
    stamps
        .into_iter()
        .filter_map(DateTime::<Utc>::from_timestamp_millis)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn minute(m: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + chrono::Duration::minutes(m)
    }

    fn policy(max_events: u32) -> WindowPolicy {
        WindowPolicy::new(max_events, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.backend(), "sqlite");

        let records = store.records("a@example.com", minute(0), minute(1000)).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_consume_until_full() {
        let store = SqliteStore::in_memory().await.unwrap();
        let p = policy(2);

        assert_eq!(
            store.consume("a@example.com", minute(0), &p).await.unwrap(),
            ConsumeOutcome::Consumed { remaining: 1 }
        );
        assert_eq!(
            store.consume("a@example.com", minute(10), &p).await.unwrap(),
            ConsumeOutcome::Consumed { remaining: 0 }
        );
        assert_eq!(
            store.consume("a@example.com", minute(20), &p).await.unwrap(),
            ConsumeOutcome::Rejected { wait_minutes: 40 }
        );
    }

    #[tokio::test]
    async fn test_consume_prunes_aged_rows() {
        let store = SqliteStore::in_memory().await.unwrap();
        let p = policy(2);

        store.consume("a@example.com", minute(0), &p).await.unwrap();
        store.consume("a@example.com", minute(10), &p).await.unwrap();
        assert!(store.consume("a@example.com", minute(61), &p).await.unwrap().is_consumed());

        // The t=0 row is gone from the table, not just ignored
        let all = store.records("a@example.com", minute(-1000), minute(1000)).await.unwrap();
        assert_eq!(all, vec![minute(10), minute(61)]);
    }

    #[tokio::test]
    async fn test_records_survive_reconnect() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("quota.db").display());
        let p = policy(5);

        {
            let store = SqliteStore::connect(&url, 2).await.unwrap();
            store.consume("a@example.com", minute(0), &p).await.unwrap();
            store.pool.close().await;
        }

        let store = SqliteStore::connect(&url, 2).await.unwrap();
        let records = store.records("a@example.com", minute(-60), minute(1000)).await.unwrap();
        assert_eq!(records, vec![minute(0)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_consume_does_not_wedge_store() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("quota.db").display());
        let store = SqliteStore::connect(&url, 2).await.unwrap();
        let p = policy(10);

        // Drop the caller at arbitrary points inside the transaction
        for _ in 0..5 {
            let _ = tokio::time::timeout(
                Duration::from_micros(1),
                store.consume("a@example.com", minute(0), &p),
            )
            .await;
        }

        for m in 1..=2 {
            let outcome = store.consume("a@example.com", minute(m), &p).await.unwrap();
            assert!(outcome.is_consumed(), "consume at t={} after cancellation", m);
        }

        // Each cancelled attempt either committed whole or not at all
        let records = store
            .records("a@example.com", minute(-60), minute(1000))
            .await
            .unwrap();
        assert!((2..=7).contains(&records.len()), "{} records", records.len());
    }

    #[tokio::test]
    async fn test_records_exclude_future_stamps() {
        let store = SqliteStore::in_memory().await.unwrap();
        let p = policy(5);
        store.consume("a@example.com", minute(0), &p).await.unwrap();
        store.consume("a@example.com", minute(30), &p).await.unwrap();

        let records = store.records("a@example.com", minute(-60), minute(20)).await.unwrap();
        assert_eq!(records, vec![minute(0)]);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.pool.close().await;

        let err = store
            .consume("a@example.com", minute(0), &policy(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::BackingStoreUnavailable(_)));

        let err = store.records("a@example.com", minute(0), minute(1000)).await.unwrap_err();
        assert!(matches!(err, QuotaError::BackingStoreUnavailable(_)));
    }
}
