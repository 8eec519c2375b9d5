use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identity {identity:?}: {reason}")]
    InvalidIdentity { identity: String, reason: String },

    #[error("key {key:?} is outside namespace {namespace:?}")]
    ForeignKey { key: String, namespace: String },
}
