//! Metadata index for tlsb2.
//!
//! Checking whether a domain exists by listing the bucket costs one request
//! per page of objects. The metadata index is a single JSON document,
//! `<prefix>/metadata.json`, mapping every stored domain and email to the id
//! of its current object. Existence checks then cost one id lookup.
//!
//! # Modules
//!
//! - [`index`] — the [`MetadataIndex`] document
//! - [`cache`] — [`IndexCache`], the load-once in-process copy that writes
//!   itself back after every change
//! - [`error`] — error types

pub mod cache;
pub mod error;
pub mod index;

pub use cache::IndexCache;
pub use error::{IndexError, IndexResult};
pub use index::MetadataIndex;
