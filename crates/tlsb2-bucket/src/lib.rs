//! Object-storage client layer for tlsb2.
//!
//! The certificate store never talks to a storage service directly. It goes
//! through the narrow [`BucketClient`] interface: upload by name, download and
//! metadata lookup by name or id, listing with optional version history, and
//! delete by name and id.
//!
//! # Backends
//!
//! - [`InMemoryBucket`] — versioned, in-process bucket for tests and embedding
//! - [`S3Bucket`] — any S3-compatible service (Backblaze B2, AWS, MinIO) via
//!   the `object_store` crate
//!
//! [`RetryPolicy`] runs network mutations with a bounded number of attempts
//! and a fixed delay between them.

pub mod error;
pub mod memory;
pub mod retry;
pub mod s3;
pub mod traits;

pub use error::{BucketError, BucketResult};
pub use memory::InMemoryBucket;
pub use retry::{Exhausted, RetryPolicy};
pub use s3::{S3Bucket, S3Config};
pub use traits::BucketClient;
