use async_trait::async_trait;
use tlsb2_lock::Waiter;
use tlsb2_types::{SiteRecord, UserRecord};

use crate::error::StorageResult;

/// Storage contract the host TLS subsystem calls into.
///
/// Implementations must be thread-safe (`Send + Sync`); the host issues calls
/// from many tasks at once.
#[async_trait]
pub trait CertStorage: Send + Sync {
    /// Returns `true` if a certificate bundle is stored for `domain`.
    async fn site_exists(&self, domain: &str) -> StorageResult<bool>;

    /// Load the certificate bundle for `domain`.
    async fn load_site(&self, domain: &str) -> StorageResult<SiteRecord>;

    /// Create or replace the certificate bundle for `domain`.
    async fn store_site(&self, domain: &str, site: &SiteRecord) -> StorageResult<()>;

    /// Delete the certificate bundle for `domain`.
    async fn delete_site(&self, domain: &str) -> StorageResult<()>;

    /// Load the ACME account data for `email`.
    async fn load_user(&self, email: &str) -> StorageResult<UserRecord>;

    /// Create or replace the ACME account data for `email`.
    async fn store_user(&self, email: &str, user: &UserRecord) -> StorageResult<()>;

    /// Email of the most recently stored account, `None` if there is none.
    async fn most_recent_user_email(&self) -> StorageResult<Option<String>>;

    /// Try to take the issuance lock for `name`.
    ///
    /// `Ok(None)` means the caller holds the lock. `Ok(Some(waiter))` means
    /// another task holds it: wait on the waiter, then try again.
    fn try_lock(&self, name: &str) -> StorageResult<Option<Waiter>>;

    /// Release the issuance lock for `name`. Releasing an unheld name is a no-op.
    fn unlock(&self, name: &str) -> StorageResult<()>;
}
