use thiserror::Error;

/// Errors from object-storage client operations.
#[derive(Debug, Error)]
pub enum BucketError {
    /// No object (or no object with the requested id) exists under the name.
    #[error("object not found: {name}")]
    NotFound { name: String },

    /// The service answered with a non-success transport status.
    #[error("status {status}: {message}")]
    Status { status: u16, message: String },

    /// An id did not have the shape this backend hands out.
    #[error("invalid object id: {0}")]
    InvalidId(String),

    /// The name cannot be used as an object key by this backend.
    #[error("invalid object name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Any other failure reported by the underlying client.
    #[error("backend error: {0}")]
    Backend(String),
}

impl BucketError {
    /// Returns `true` if the error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            BucketError::NotFound { .. } => true,
            BucketError::Status { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// Result alias for bucket operations.
pub type BucketResult<T> = Result<T, BucketError>;
