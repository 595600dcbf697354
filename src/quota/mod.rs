//! Download Quota Module
//!
//! This module enforces the per-identity download quota: at most
//! `max_events` documents inside a trailing window.
//!
//! # Features
//!
//! - Sliding window over stored consumption timestamps (no token bucket,
//!   no stored "blocked" flag)
//! - Read-only `check` separated from mutating `consume`
//! - In-memory store with per-identity locks, or a SQLite table
//! - Lazy pruning on access; no background sweeper
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       QuotaTracker                           │
//! │        validate identity → WindowPolicy → QuotaStore         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐    ┌──────────────────────────┐   │
//! │  │ MemoryStore          │    │ SqliteStore              │   │
//! │  │ per-identity Mutex   │    │ BEGIN IMMEDIATE + table  │   │
//! │  └──────────────────────┘    └──────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod sqlite;
pub mod store;
pub mod tracker;
pub mod window;

pub use config::{QuotaConfig, StoreKind};
pub use error::QuotaError;
pub use sqlite::SqliteStore;
pub use store::{MemoryStore, QuotaStore};
pub use tracker::QuotaTracker;
pub use window::{ConsumeOutcome, Decision, WindowPolicy};
