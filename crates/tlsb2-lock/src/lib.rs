//! Named, process-local locks for certificate issuance.
//!
//! The host TLS subsystem takes a lock per domain before it obtains or renews
//! a certificate, so two tasks in one process never race on the same name.
//!
//! These locks are local to one [`LocalLockTable`] instance. They provide no
//! exclusion between processes or machines sharing the same bucket.

pub mod error;
pub mod table;

pub use error::{LockError, LockResult};
pub use table::{LocalLockTable, Waiter};
