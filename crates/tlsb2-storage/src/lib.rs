//! Certificate storage for an automated TLS subsystem, backed by object
//! storage instead of the local filesystem.
//!
//! The host calls into a [`CertStorage`] implementation to check, load,
//! store and delete site certificate bundles and ACME account data, to pick
//! the most recently used ACME account, and to serialize issuance per name.
//! [`B2Storage`] implements it over any [`BucketClient`](tlsb2_bucket::BucketClient),
//! normally Backblaze B2 through its S3-compatible API.
//!
//! # Data flow
//!
//! ```text
//! host -> B2Storage -> IndexCache (optional) -> BucketClient -> bucket
//!                   \-> LocalLockTable (process-local)
//! ```
//!
//! # Limitations
//!
//! Locks are local to one process. Two hosts sharing a bucket can still
//! issue certificates for the same name concurrently.

pub mod config;
pub mod error;
pub mod recent;
pub mod storage;
pub mod traits;

pub use config::{B2Credentials, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use recent::most_recent_identity;
pub use storage::B2Storage;
pub use traits::CertStorage;

pub use tlsb2_lock::Waiter;
pub use tlsb2_types::{SiteRecord, UserRecord};
