//! Quota Configuration
//!
//! Configuration for the sliding-window download quota.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default quota limits
pub const DEFAULT_MAX_EVENTS: u32 = 20; // downloads per window
pub const DEFAULT_WINDOW_SECS: u64 = 24 * 3600; // trailing 24 hours
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Which backing store holds the consumption records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Process-local map, lost on restart
    Memory,
    /// SQLite table, survives restarts
    Sqlite,
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "sqlite" => Ok(StoreKind::Sqlite),
            other => Err(format!(
                "Invalid quota store: {}. Must be 'memory' or 'sqlite'",
                other
            )),
        }
    }
}

/// Quota configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotaConfig {
    /// Maximum consumptions allowed inside one window
    pub max_events: u32,

    /// Length of the trailing window in seconds
    pub window_secs: u64,

    /// Backing store selection
    pub store: StoreKind,

    /// Database URL (required when store is sqlite)
    pub database_url: Option<String>,

    /// Connection pool size for the sqlite store
    pub max_connections: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
            window_secs: DEFAULT_WINDOW_SECS,
            store: StoreKind::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl QuotaConfig {
    /// Create a quota configuration with an in-memory store
    pub fn new(max_events: u32, window: Duration) -> Self {
        Self {
            max_events,
            window_secs: window.as_secs(),
            ..Self::default()
        }
    }

    /// Get the window duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Window length in whole minutes, as reported to clients
    pub fn window_minutes(&self) -> u64 {
        self.window_secs / 60
    }
}
