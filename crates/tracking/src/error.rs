//! Tracking Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. The kinds map onto what a caller can do about them:
//! give up, retry the batch, or fix the input.

use derive_more::{Display, Error};

/// A tracking store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for tracking store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The database could not be opened, configured or migrated. The store
    /// cannot operate.
    #[display("database initialization error")]
    Initialization,
    /// A statement or transaction failed. Any write has been rolled back.
    #[display("database transaction error")]
    Transaction,
    /// A record in an upsert batch is malformed; the whole batch was rejected.
    #[display("invalid record at index {index}: {reason}")]
    Validation { index: usize, reason: &'static str },
    /// A stored row could not be converted back into a model.
    #[display("invalid tracking data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// The store is not attached to a database (detached or closed).
    #[display("tracking store is not attached to a database")]
    Detached,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transaction)
    }
}
