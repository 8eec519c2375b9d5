use thiserror::Error;

/// Errors from lock table operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// A thread panicked while holding the table's internal mutex.
    #[error("lock table poisoned: {0}")]
    Poisoned(String),
}

/// Result alias for lock table operations.
pub type LockResult<T> = Result<T, LockError>;
