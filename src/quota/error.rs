//! Quota Error Types

/// Errors surfaced by the quota tracker
///
/// Quota exhaustion is not an error; it is reported through
/// [`Decision::Denied`](super::Decision) and
/// [`ConsumeOutcome::Rejected`](super::ConsumeOutcome).
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// Identity missing or blank
    #[error("Invalid identity: must be a non-empty string")]
    InvalidIdentity,

    /// Backing store could not be read or written
    #[error("Quota store unavailable: {0}")]
    BackingStoreUnavailable(String),
}

impl From<sqlx::Error> for QuotaError {
    fn from(err: sqlx::Error) -> Self {
        QuotaError::BackingStoreUnavailable(err.to_string())
    }
}
