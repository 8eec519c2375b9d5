use thiserror::Error;
use tlsb2_bucket::BucketError;
use tlsb2_index::IndexError;
use tlsb2_lock::LockError;
use tlsb2_types::TypeError;

/// Errors from certificate storage operations.
///
/// Every variant raised while serving a call names the logical operation
/// (`op`, e.g. `load_site/download`) alongside the underlying cause.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Missing or invalid configuration, raised before any network access.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("op:{op} {source}")]
    InvalidIdentity {
        op: &'static str,
        #[source]
        source: TypeError,
    },

    /// The object does not exist.
    #[error("op:{op} not found: {name}")]
    NotFound { op: &'static str, name: String },

    /// Stored bytes are not valid JSON for the expected record.
    #[error("op:{op} decode {name}: {source}")]
    Decode {
        op: &'static str,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("op:{op} encode: {source}")]
    Encode {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Every upload attempt failed; carries the last failure.
    #[error("op:{op} upload {name} failed after {attempts} attempts: {source}")]
    Upload {
        op: &'static str,
        name: String,
        attempts: u32,
        #[source]
        source: BucketError,
    },

    #[error("op:{op} delete {name}: {source}")]
    Delete {
        op: &'static str,
        name: String,
        #[source]
        source: BucketError,
    },

    #[error("op:{op} list {prefix}: {source}")]
    List {
        op: &'static str,
        prefix: String,
        #[source]
        source: BucketError,
    },

    /// Any other object-store failure.
    #[error("op:{op} b2: {source}")]
    Bucket {
        op: &'static str,
        #[source]
        source: BucketError,
    },

    #[error("op:{op} index: {source}")]
    Index {
        op: &'static str,
        #[source]
        source: IndexError,
    },

    #[error("op:{op} lock: {source}")]
    Lock {
        op: &'static str,
        #[source]
        source: LockError,
    },
}

impl StorageError {
    /// Wrap an object-store failure, keeping its not-found classification.
    pub(crate) fn bucket(op: &'static str, name: &str, source: BucketError) -> Self {
        if source.is_not_found() {
            StorageError::NotFound {
                op,
                name: name.to_string(),
            }
        } else {
            StorageError::Bucket { op, source }
        }
    }

    /// Returns `true` if the error means the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Logical operation that failed, if the error came from a call.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            StorageError::Config(_) => None,
            StorageError::InvalidIdentity { op, .. }
            | StorageError::NotFound { op, .. }
            | StorageError::Decode { op, .. }
            | StorageError::Encode { op, .. }
            | StorageError::Upload { op, .. }
            | StorageError::Delete { op, .. }
            | StorageError::List { op, .. }
            | StorageError::Bucket { op, .. }
            | StorageError::Index { op, .. }
            | StorageError::Lock { op, .. } => Some(*op),
        }
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
