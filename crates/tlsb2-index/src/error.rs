use thiserror::Error;
use tlsb2_bucket::BucketError;

/// Errors from metadata index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index document exists but is not valid index JSON.
    #[error("decode index {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode index: {0}")]
    Encode(#[source] serde_json::Error),

    /// Fetching the index document failed for a reason other than absence.
    #[error("download index {key}: {source}")]
    Download {
        key: String,
        #[source]
        source: BucketError,
    },

    /// Writing the index back failed on every attempt.
    #[error("upload index {key} failed after {attempts} attempts: {source}")]
    Upload {
        key: String,
        attempts: u32,
        #[source]
        source: BucketError,
    },
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
