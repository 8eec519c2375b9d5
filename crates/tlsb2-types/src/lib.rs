//! Foundation types for tlsb2, a certificate store backed by object storage.
//!
//! Every other tlsb2 crate depends on `tlsb2-types`.
//!
//! # Key Types
//!
//! - [`SiteRecord`] — certificate, private key and metadata for one domain
//! - [`UserRecord`] — ACME registration and account key for one email
//! - [`ObjectId`] — opaque identifier the object store assigns to an upload
//! - [`FileInfo`] — name, id, size and upload time of a stored object
//! - [`Namespace`] — maps identities to object keys under a root prefix

pub mod error;
pub mod identity;
pub mod namespace;
pub mod object;
pub mod record;

pub use error::TypeError;
pub use identity::validate_identity;
pub use namespace::{Kind, Namespace, DEFAULT_PREFIX};
pub use object::{FileInfo, ObjectId};
pub use record::{SiteRecord, UserRecord};
