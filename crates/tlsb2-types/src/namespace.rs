//! Object-key layout in the bucket.
//!
//! ```text
//! <prefix>/
//! ├── metadata.json        # Metadata index (domain/email -> object id)
//! ├── domain/<domain>      # SiteRecord JSON
//! └── user/<email>         # UserRecord JSON
//! ```
//!
//! Domains and users live in separate segments so a domain can never collide
//! with an email. Everything the storage writes sits under the prefix, which
//! lets tests use their own prefix and truncate it without touching anything
//! else in the bucket.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::validate_identity;

/// Root prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "caddytls";

const METADATA_NAME: &str = "metadata.json";

/// Which sub-namespace an identity belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Domain,
    User,
}

impl Kind {
    pub fn segment(self) -> &'static str {
        match self {
            Kind::Domain => "domain",
            Kind::User => "user",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Pure mapping from identities to object keys under a root prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    /// Create a namespace rooted at `prefix`. Surrounding slashes are dropped.
    pub fn new(prefix: impl AsRef<str>) -> Self {
        Self {
            prefix: prefix.as_ref().trim_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Listing prefix covering every object this namespace owns.
    pub fn root(&self) -> String {
        format!("{}/", self.prefix)
    }

    /// Listing prefix covering every object of one kind.
    pub fn kind_root(&self, kind: Kind) -> String {
        format!("{}/{}/", self.prefix, kind.segment())
    }

    /// Object key for an identity, e.g. `caddytls/domain/example.com`.
    pub fn key(&self, kind: Kind, identity: &str) -> Result<String, TypeError> {
        validate_identity(identity)?;
        Ok(format!("{}{}", self.kind_root(kind), identity))
    }

    pub fn domain_key(&self, domain: &str) -> Result<String, TypeError> {
        self.key(Kind::Domain, domain)
    }

    pub fn user_key(&self, email: &str) -> Result<String, TypeError> {
        self.key(Kind::User, email)
    }

    /// Key of the metadata index document.
    pub fn metadata_key(&self) -> String {
        format!("{}/{}", self.prefix, METADATA_NAME)
    }

    /// Recover the identity from an object key of the given kind.
    pub fn identity_of<'a>(&self, kind: Kind, key: &'a str) -> Result<&'a str, TypeError> {
        let root = self.kind_root(kind);
        match key.strip_prefix(root.as_str()) {
            Some(identity) if !identity.is_empty() && !identity.contains('/') => Ok(identity),
            _ => Err(TypeError::ForeignKey {
                key: key.to_string(),
                namespace: root,
            }),
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
