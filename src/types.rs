//! Error taxonomy for the anchorage engine
//!
//! Transient adapter failures are kept distinct from logical integrity
//! failures: `AdapterUnavailable` never triggers recovery, while
//! `RecoveryFailed` is always ledger-logged before being surfaced.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, AnchorageError>;

/// Error types for engine operations
#[derive(Debug, Error)]
pub enum AnchorageError {
    /// Anchor or content store unreachable / timed out. Safe to retry at the
    /// caller's discretion; never classified as tampering.
    #[error("Adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// No anchor record exists for the asset
    #[error("No anchor record for asset: {0}")]
    AnchorNotFound(String),

    /// Anchor write submission failed
    #[error("Anchor write failed: {0}")]
    AnchorWriteError(String),

    /// Asset (or blob) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Asset already exists with an active current version
    #[error("Asset already exists: {0}")]
    AlreadyExists(String),

    /// Critical metadata failed boundary validation
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Both recovery strategies exhausted; state left untouched
    #[error("Recovery failed: {0}")]
    RecoveryFailed(String),

    /// Optimistic-concurrency violation on an asset write
    #[error("Version conflict on {asset_id}: expected {expected}, found {actual}")]
    VersionConflict {
        asset_id: String,
        expected: u64,
        actual: u64,
    },

    /// Caller is not the asset owner (or pending recipient)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A transfer is already pending for the asset
    #[error("Transfer already pending for asset: {0}")]
    TransferPending(String),

    /// No pending transfer to act on
    #[error("No pending transfer for asset: {0}")]
    NoPendingTransfer(String),

    /// Record store / database failure
    #[error("Database error: {0}")]
    Database(String),

    /// Ledger append or query failure
    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl AnchorageError {
    /// Whether this error represents a transient infrastructure failure
    /// rather than a logical integrity condition.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnchorageError::AdapterUnavailable(_))
    }
}
