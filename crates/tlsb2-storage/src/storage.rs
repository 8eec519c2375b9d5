use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tlsb2_bucket::{BucketClient, RetryPolicy, S3Bucket};
use tlsb2_index::{IndexCache, MetadataIndex};
use tlsb2_lock::{LocalLockTable, Waiter};
use tlsb2_types::{Kind, Namespace, SiteRecord, UserRecord};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::config::{B2Credentials, StorageConfig};
use crate::error::{StorageError, StorageResult};
use crate::recent::most_recent_identity;
use crate::traits::CertStorage;

/// Certificate and account storage over a bucket.
///
/// Sites live under `<prefix>/domain/<domain>`, accounts under
/// `<prefix>/user/<email>`, each as one JSON object. With the metadata index
/// enabled, existence checks and loads resolve object ids through the index
/// instead of listing the bucket, and the index is written back after every
/// store or delete.
///
/// Writes to one key are serialized: an upload and the index entry it
/// produces land together, so overlapping stores of a name leave the index
/// pointing at the object that is actually current.
///
/// The lock table and the index belong to this instance. Two instances in one
/// process do not coordinate with each other.
pub struct B2Storage {
    client: Arc<dyn BucketClient>,
    namespace: Namespace,
    retry: RetryPolicy,
    index: Option<IndexCache>,
    locks: LocalLockTable,
    /// Per-key write guards, dropped from the map once nobody holds them.
    writes: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl B2Storage {
    pub fn new(client: Arc<dyn BucketClient>, config: StorageConfig) -> Self {
        let namespace = config.namespace();
        let index = config
            .use_index
            .then(|| IndexCache::new(client.clone(), &namespace, config.retry.clone()));
        Self {
            client,
            namespace,
            retry: config.retry,
            index,
            locks: LocalLockTable::new(),
            writes: Mutex::new(HashMap::new()),
        }
    }

    /// Build a storage from `B2_*` environment variables.
    ///
    /// Fails with [`StorageError::Config`] before any network access if a
    /// required variable is missing or empty.
    pub fn from_env(config: StorageConfig) -> StorageResult<Self> {
        let credentials = B2Credentials::from_env()?;
        Self::from_credentials(&credentials, config)
    }

    pub fn from_credentials(credentials: &B2Credentials, config: StorageConfig) -> StorageResult<Self> {
        debug!(
            account_id = %credentials.account_id,
            bucket = %credentials.bucket,
            endpoint = %credentials.endpoint(),
            "configuring B2 storage"
        );
        let client = S3Bucket::new(&credentials.to_s3_config())
            .map_err(|e| StorageError::Config(format!("cannot build B2 client: {e}")))?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn locks(&self) -> &LocalLockTable {
        &self.locks
    }

    pub fn uses_index(&self) -> bool {
        self.index.is_some()
    }

    /// Take the write guard for `key`, waiting for any write in flight.
    async fn write_guard(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut writes = self.writes.lock().await;
            writes.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(writes.entry(key.to_string()).or_default())
        };
        slot.lock_owned().await
    }

    fn key(&self, op: &'static str, kind: Kind, identity: &str) -> StorageResult<String> {
        self.namespace
            .key(kind, identity)
            .map_err(|source| StorageError::InvalidIdentity { op, source })
    }

    async fn list(&self, op: &'static str, prefix: &str, versions: bool) -> StorageResult<Vec<tlsb2_types::FileInfo>> {
        self.client
            .list(prefix, versions)
            .await
            .map_err(|source| StorageError::List {
                op,
                prefix: prefix.to_string(),
                source,
            })
    }

    async fn exists(&self, op: &'static str, kind: Kind, identity: &str) -> StorageResult<bool> {
        let key = self.key(op, kind, identity)?;

        let Some(index) = &self.index else {
            let files = self.list(op, &self.namespace.kind_root(kind), false).await?;
            return Ok(files.iter().any(|f| f.name == key));
        };

        let id = index
            .lookup(kind, identity)
            .await
            .map_err(|source| StorageError::Index { op, source })?;
        let Some(id) = id else {
            return Ok(false);
        };
        match self.client.info_by_id(&key, &id).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => {
                debug!(%key, %id, "indexed object is gone");
                Ok(false)
            }
            Err(source) => Err(StorageError::Bucket { op, source }),
        }
    }

    async fn load<T: DeserializeOwned>(&self, op: &'static str, kind: Kind, identity: &str) -> StorageResult<T> {
        let key = self.key(op, kind, identity)?;

        let body = match &self.index {
            Some(index) => {
                let id = index
                    .lookup(kind, identity)
                    .await
                    .map_err(|source| StorageError::Index { op, source })?
                    .ok_or_else(|| StorageError::NotFound {
                        op,
                        name: key.clone(),
                    })?;
                self.client.download_by_id(&key, &id).await
            }
            None => self.client.download_by_name(&key).await,
        }
        .map_err(|e| StorageError::bucket(op, &key, e))?;

        debug!(%key, size = body.len(), "loaded object");
        serde_json::from_slice(&body).map_err(|source| StorageError::Decode {
            op,
            name: key,
            source,
        })
    }

    async fn store<T: Serialize + Sync>(
        &self,
        op: &'static str,
        kind: Kind,
        identity: &str,
        record: &T,
    ) -> StorageResult<()> {
        let key = self.key(op, kind, identity)?;
        let body = Bytes::from(serde_json::to_vec(record).map_err(|source| StorageError::Encode { op, source })?);

        let _guard = self.write_guard(&key).await;
        let info = self
            .retry
            .run(op, || self.client.upload(&key, body.clone()))
            .await
            .map_err(|e| StorageError::Upload {
                op,
                name: key.clone(),
                attempts: e.attempts,
                source: e.last,
            })?;

        if let Some(index) = &self.index {
            index
                .record(kind, identity, info.id.clone())
                .await
                .map_err(|source| StorageError::Index { op, source })?;
        }

        info!(%key, id = %info.id, size = info.size, "stored object");
        Ok(())
    }

    async fn delete(&self, op: &'static str, kind: Kind, identity: &str) -> StorageResult<()> {
        let key = self.key(op, kind, identity)?;
        let _guard = self.write_guard(&key).await;

        let versions: Vec<_> = self
            .list(op, &self.namespace.kind_root(kind), true)
            .await?
            .into_iter()
            .filter(|f| f.name == key)
            .collect();
        if versions.is_empty() {
            return Err(StorageError::NotFound { op, name: key });
        }

        for version in &versions {
            self.client
                .delete(&key, &version.id)
                .await
                .map_err(|source| StorageError::Delete {
                    op,
                    name: key.clone(),
                    source,
                })?;
        }

        if let Some(index) = &self.index {
            index
                .forget(kind, identity)
                .await
                .map_err(|source| StorageError::Index { op, source })?;
        }

        info!(%key, versions = versions.len(), "deleted object");
        Ok(())
    }

    async fn identities(&self, op: &'static str, kind: Kind) -> StorageResult<Vec<String>> {
        let files = self.list(op, &self.namespace.kind_root(kind), false).await?;
        Ok(files
            .iter()
            .filter_map(|f| self.namespace.identity_of(kind, &f.name).ok())
            .map(str::to_string)
            .collect())
    }

    /// Domains with a stored certificate bundle, sorted.
    pub async fn list_sites(&self) -> StorageResult<Vec<String>> {
        self.identities("list_sites", Kind::Domain).await
    }

    /// Emails with stored account data, sorted.
    pub async fn list_users(&self) -> StorageResult<Vec<String>> {
        self.identities("list_users", Kind::User).await
    }

    /// Rebuild the metadata index from a bucket listing and persist it.
    ///
    /// Returns the number of indexed entries.
    pub async fn rebuild_index(&self) -> StorageResult<usize> {
        const OP: &str = "rebuild_index";
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| StorageError::Config("metadata index is disabled".into()))?;

        let files = self.list(OP, &self.namespace.root(), false).await?;
        let rebuilt = MetadataIndex::from_listing(&self.namespace, &files);
        let entries = rebuilt.len();
        index
            .replace(rebuilt)
            .await
            .map_err(|source| StorageError::Index { op: OP, source })?;

        info!(entries, "rebuilt metadata index");
        Ok(entries)
    }

    /// Delete every version of every object under the prefix.
    ///
    /// Objects outside the prefix are left alone. Returns the number of
    /// deleted versions.
    pub async fn truncate(&self) -> StorageResult<usize> {
        const OP: &str = "truncate";
        let files = self.list(OP, &self.namespace.root(), true).await?;
        for file in &files {
            self.client
                .delete(&file.name, &file.id)
                .await
                .map_err(|source| StorageError::Delete {
                    op: OP,
                    name: file.name.clone(),
                    source,
                })?;
        }
        if let Some(index) = &self.index {
            index.reset().await;
        }

        info!(prefix = %self.namespace.prefix(), deleted = files.len(), "truncated storage");
        Ok(files.len())
    }
}

#[async_trait]
impl CertStorage for B2Storage {
    async fn site_exists(&self, domain: &str) -> StorageResult<bool> {
        self.exists("site_exists", Kind::Domain, domain).await
    }

    async fn load_site(&self, domain: &str) -> StorageResult<SiteRecord> {
        self.load("load_site", Kind::Domain, domain).await
    }

    async fn store_site(&self, domain: &str, site: &SiteRecord) -> StorageResult<()> {
        self.store("store_site", Kind::Domain, domain, site).await
    }

    async fn delete_site(&self, domain: &str) -> StorageResult<()> {
        self.delete("delete_site", Kind::Domain, domain).await
    }

    async fn load_user(&self, email: &str) -> StorageResult<UserRecord> {
        self.load("load_user", Kind::User, email).await
    }

    async fn store_user(&self, email: &str, user: &UserRecord) -> StorageResult<()> {
        self.store("store_user", Kind::User, email, user).await
    }

    async fn most_recent_user_email(&self) -> StorageResult<Option<String>> {
        let files = self
            .list("most_recent_user_email", &self.namespace.kind_root(Kind::User), false)
            .await?;
        Ok(most_recent_identity(&self.namespace, Kind::User, &files))
    }

    fn try_lock(&self, name: &str) -> StorageResult<Option<Waiter>> {
        self.locks
            .try_lock(name)
            .map_err(|source| StorageError::Lock { op: "try_lock", source })
    }

    fn unlock(&self, name: &str) -> StorageResult<()> {
        self.locks
            .unlock(name)
            .map_err(|source| StorageError::Lock { op: "unlock", source })
    }
}

impl std::fmt::Debug for B2Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("B2Storage")
            .field("prefix", &self.namespace.prefix())
            .field("use_index", &self.uses_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tlsb2_bucket::InMemoryBucket;
    use tlsb2_types::{FileInfo, ObjectId};

    fn config(use_index: bool) -> StorageConfig {
        StorageConfig {
            prefix: "test_caddytls".into(),
            use_index,
            retry: RetryPolicy {
                max_attempts: 5,
                delay: Duration::from_millis(1),
            },
        }
    }

    fn storage(use_index: bool) -> (Arc<InMemoryBucket>, B2Storage) {
        let bucket = Arc::new(InMemoryBucket::new());
        let storage = B2Storage::new(bucket.clone(), config(use_index));
        (bucket, storage)
    }

    fn s3_bucket() -> Arc<S3Bucket> {
        Arc::new(S3Bucket::from_store(Arc::new(InMemory::new())))
    }

    fn s3_storage(use_index: bool) -> B2Storage {
        B2Storage::new(s3_bucket(), config(use_index))
    }

    fn site() -> SiteRecord {
        SiteRecord::new("cert", "key", "meta")
    }

    /// Delegating client whose first upload stalls for `delay`.
    struct SlowFirstUpload {
        inner: Arc<dyn BucketClient>,
        stalled: AtomicBool,
        delay: Duration,
    }

    #[async_trait]
    impl BucketClient for SlowFirstUpload {
        async fn upload(&self, name: &str, data: Bytes) -> tlsb2_bucket::BucketResult<FileInfo> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.upload(name, data).await
        }

        async fn download_by_name(&self, name: &str) -> tlsb2_bucket::BucketResult<Bytes> {
            self.inner.download_by_name(name).await
        }

        async fn download_by_id(&self, name: &str, id: &ObjectId) -> tlsb2_bucket::BucketResult<Bytes> {
            self.inner.download_by_id(name, id).await
        }

        async fn info_by_name(&self, name: &str) -> tlsb2_bucket::BucketResult<FileInfo> {
            self.inner.info_by_name(name).await
        }

        async fn info_by_id(&self, name: &str, id: &ObjectId) -> tlsb2_bucket::BucketResult<FileInfo> {
            self.inner.info_by_id(name, id).await
        }

        async fn list(&self, prefix: &str, versions: bool) -> tlsb2_bucket::BucketResult<Vec<FileInfo>> {
            self.inner.list(prefix, versions).await
        }

        async fn delete(&self, name: &str, id: &ObjectId) -> tlsb2_bucket::BucketResult<()> {
            self.inner.delete(name, id).await
        }
    }

    async fn site_lifecycle(s: B2Storage) {
        const DOMAIN: &str = "foobar.com";

        assert!(!s.site_exists(DOMAIN).await.unwrap());

        s.store_site(DOMAIN, &site()).await.unwrap();
        assert!(s.site_exists(DOMAIN).await.unwrap());

        let loaded = s.load_site(DOMAIN).await.unwrap();
        assert_eq!(loaded.cert, b"cert");
        assert_eq!(loaded.key, b"key");
        assert_eq!(loaded.meta, b"meta");

        s.delete_site(DOMAIN).await.unwrap();
        assert!(!s.site_exists(DOMAIN).await.unwrap());
        assert!(s.load_site(DOMAIN).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn site_lifecycle_listing() {
        site_lifecycle(storage(false).1).await;
    }

    #[tokio::test]
    async fn site_lifecycle_indexed() {
        site_lifecycle(storage(true).1).await;
    }

    #[tokio::test]
    async fn site_lifecycle_s3_listing() {
        site_lifecycle(s3_storage(false)).await;
    }

    #[tokio::test]
    async fn site_lifecycle_s3_indexed() {
        site_lifecycle(s3_storage(true)).await;
    }

    async fn user_roundtrip(s: B2Storage) {
        let user = UserRecord::new(vec![0u8, 1, 2, 255], "account-key");
        assert!(s.load_user("me@foobar.com").await.unwrap_err().is_not_found());

        s.store_user("me@foobar.com", &user).await.unwrap();
        assert_eq!(s.load_user("me@foobar.com").await.unwrap(), user);
    }

    #[tokio::test]
    async fn user_roundtrip_listing() {
        user_roundtrip(storage(false).1).await;
    }

    #[tokio::test]
    async fn user_roundtrip_indexed() {
        user_roundtrip(storage(true).1).await;
    }

    #[tokio::test]
    async fn user_roundtrip_s3_listing() {
        user_roundtrip(s3_storage(false)).await;
    }

    #[tokio::test]
    async fn user_roundtrip_s3_indexed() {
        user_roundtrip(s3_storage(true)).await;
    }

    async fn overlapping_stores_keep_latest(use_index: bool) {
        let client = Arc::new(SlowFirstUpload {
            inner: s3_bucket(),
            stalled: AtomicBool::new(false),
            delay: Duration::from_millis(100),
        });
        let s = Arc::new(B2Storage::new(client, config(use_index)));

        let first = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.store_site("a.com", &SiteRecord::new("old", "k", "m")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        s.store_site("a.com", &SiteRecord::new("new", "k", "m")).await.unwrap();
        first.await.unwrap().unwrap();

        assert!(s.site_exists("a.com").await.unwrap());
        assert_eq!(s.load_site("a.com").await.unwrap().cert, b"new");

        if use_index {
            let fresh = B2Storage::new(Arc::clone(&s.client), config(true));
            assert_eq!(fresh.load_site("a.com").await.unwrap().cert, b"new");
        }
    }

    #[tokio::test]
    async fn overlapping_stores_keep_latest_indexed() {
        overlapping_stores_keep_latest(true).await;
    }

    #[tokio::test]
    async fn overlapping_stores_keep_latest_listing() {
        overlapping_stores_keep_latest(false).await;
    }

    #[tokio::test]
    async fn concurrent_stores_of_one_site_on_s3() {
        let s = Arc::new(s3_storage(true));
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let s = Arc::clone(&s);
                tokio::spawn(async move {
                    s.store_site("a.com", &SiteRecord::new(format!("cert-{i}"), "k", "m"))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        assert!(s.site_exists("a.com").await.unwrap());
        let stored = s.client.download_by_name("test_caddytls/domain/a.com").await.unwrap();
        let current: SiteRecord = serde_json::from_slice(&stored).unwrap();
        assert_eq!(s.load_site("a.com").await.unwrap(), current);
    }

    #[tokio::test]
    async fn identities_come_back_verbatim_on_s3() {
        let s = s3_storage(false);
        s.store_user("first~tag@x.com", &UserRecord::new("r", "k")).await.unwrap();
        s.store_site("x{y}.com", &site()).await.unwrap();

        assert_eq!(
            s.most_recent_user_email().await.unwrap().as_deref(),
            Some("first~tag@x.com")
        );
        assert_eq!(s.list_users().await.unwrap(), ["first~tag@x.com"]);
        assert_eq!(s.list_sites().await.unwrap(), ["x{y}.com"]);
        assert!(s.site_exists("x{y}.com").await.unwrap());
    }

    #[tokio::test]
    async fn rebuilt_index_uses_verbatim_identities_on_s3() {
        let bucket = s3_bucket();
        let writer = B2Storage::new(bucket.clone(), config(false));
        writer.store_user("a|b@x.com", &UserRecord::new("r", "k")).await.unwrap();

        let indexed = B2Storage::new(bucket, config(true));
        assert_eq!(indexed.rebuild_index().await.unwrap(), 1);
        assert_eq!(
            indexed.load_user("a|b@x.com").await.unwrap(),
            UserRecord::new("r", "k")
        );
    }

    #[tokio::test]
    async fn renewal_overwrites_site() {
        let (_, s) = storage(true);
        s.store_site("a.com", &SiteRecord::new("old", "k", "m")).await.unwrap();
        s.store_site("a.com", &SiteRecord::new("new", "k", "m")).await.unwrap();
        assert_eq!(s.load_site("a.com").await.unwrap().cert, b"new");
    }

    #[tokio::test]
    async fn delete_removes_every_version() {
        let (bucket, s) = storage(false);
        s.store_site("a.com", &site()).await.unwrap();
        s.store_site("a.com", &site()).await.unwrap();
        assert_eq!(bucket.version_count("test_caddytls/domain/a.com"), 2);

        s.delete_site("a.com").await.unwrap();
        assert_eq!(bucket.version_count("test_caddytls/domain/a.com"), 0);
        assert!(!s.site_exists("a.com").await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_site_is_not_found() {
        let (_, s) = storage(false);
        let err = s.delete_site("nope.com").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.op(), Some("delete_site"));
    }

    #[tokio::test]
    async fn site_and_user_do_not_collide() {
        let (_, s) = storage(false);
        s.store_site("same", &site()).await.unwrap();
        assert!(s.load_user("same").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn upload_retries_then_succeeds() {
        let (bucket, s) = storage(false);
        bucket.fail_next_uploads(4);
        s.store_site("a.com", &site()).await.unwrap();
        assert!(s.site_exists("a.com").await.unwrap());
    }

    #[tokio::test]
    async fn upload_gives_up_after_five_attempts() {
        let (bucket, s) = storage(false);
        bucket.fail_next_uploads(5);
        let err = s.store_site("a.com", &site()).await.unwrap_err();
        match err {
            StorageError::Upload { op, attempts, ref source, .. } => {
                assert_eq!(op, "store_site");
                assert_eq!(attempts, 5);
                assert!(matches!(source, tlsb2_bucket::BucketError::Status { status: 503, .. }));
            }
            other => panic!("expected upload error, got {other:?}"),
        }
        assert!(!s.site_exists("a.com").await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_record_is_decode_error() {
        let (bucket, s) = storage(false);
        bucket
            .upload("test_caddytls/domain/a.com", Bytes::from_static(b"{\"Cert\": 12"))
            .await
            .unwrap();
        let err = s.load_site("a.com").await.unwrap_err();
        assert!(matches!(err, StorageError::Decode { op: "load_site", .. }));
    }

    #[tokio::test]
    async fn list_failure_is_list_error() {
        let (bucket, s) = storage(false);
        bucket.fail_next_lists(1);
        let err = s.site_exists("a.com").await.unwrap_err();
        assert!(matches!(err, StorageError::List { op: "site_exists", .. }));
    }

    #[tokio::test]
    async fn invalid_identity_is_rejected() {
        let (bucket, s) = storage(false);
        let err = s.store_site("../escape", &site()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidIdentity { op: "store_site", .. }));
        assert!(bucket.is_empty());
    }

    async fn most_recent_user_is_last_stored(s: B2Storage) {
        // Spaced out so backends with coarse upload timestamps still order them.
        let pause = || tokio::time::sleep(Duration::from_millis(5));
        assert_eq!(s.most_recent_user_email().await.unwrap(), None);

        s.store_user("a@foobar.com", &UserRecord::new("r", "k")).await.unwrap();
        pause().await;
        s.store_user("b@foobar.com", &UserRecord::new("r", "k")).await.unwrap();
        assert_eq!(
            s.most_recent_user_email().await.unwrap().as_deref(),
            Some("b@foobar.com")
        );

        pause().await;
        s.store_user("a@foobar.com", &UserRecord::new("r2", "k")).await.unwrap();
        assert_eq!(
            s.most_recent_user_email().await.unwrap().as_deref(),
            Some("a@foobar.com")
        );
    }

    #[tokio::test]
    async fn most_recent_user_in_memory() {
        most_recent_user_is_last_stored(storage(false).1).await;
    }

    #[tokio::test]
    async fn most_recent_user_on_s3() {
        most_recent_user_is_last_stored(s3_storage(false)).await;
    }

    #[tokio::test]
    async fn most_recent_ignores_sites() {
        let (_, s) = storage(true);
        s.store_user("a@foobar.com", &UserRecord::new("r", "k")).await.unwrap();
        s.store_site("later.com", &site()).await.unwrap();
        assert_eq!(
            s.most_recent_user_email().await.unwrap().as_deref(),
            Some("a@foobar.com")
        );
    }

    #[tokio::test]
    async fn index_is_written_back_and_shared_across_instances() {
        let (bucket, first) = storage(true);
        first.store_site("a.com", &site()).await.unwrap();
        assert_eq!(bucket.version_count("test_caddytls/metadata.json"), 1);

        let second = B2Storage::new(bucket.clone(), config(true));
        assert!(second.site_exists("a.com").await.unwrap());
        assert_eq!(second.load_site("a.com").await.unwrap(), site());
    }

    #[tokio::test]
    async fn indexed_exists_is_false_when_object_vanished() {
        let (bucket, s) = storage(true);
        s.store_site("a.com", &site()).await.unwrap();
        let info = bucket.info_by_name("test_caddytls/domain/a.com").await.unwrap();
        bucket.delete(&info.name, &info.id).await.unwrap();

        assert!(!s.site_exists("a.com").await.unwrap());
        assert!(s.load_site("a.com").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn index_hides_records_it_does_not_know() {
        let (bucket, s) = storage(true);
        bucket
            .upload(
                "test_caddytls/domain/legacy.com",
                Bytes::from(serde_json::to_vec(&site()).unwrap()),
            )
            .await
            .unwrap();
        assert!(!s.site_exists("legacy.com").await.unwrap());

        assert_eq!(s.rebuild_index().await.unwrap(), 1);
        assert!(s.site_exists("legacy.com").await.unwrap());
        assert_eq!(s.load_site("legacy.com").await.unwrap(), site());
    }

    #[tokio::test]
    async fn rebuild_index_requires_index() {
        let (_, s) = storage(false);
        assert!(matches!(
            s.rebuild_index().await.unwrap_err(),
            StorageError::Config(_)
        ));
    }

    #[tokio::test]
    async fn corrupt_index_fails_loudly() {
        let (bucket, s) = storage(true);
        bucket
            .upload("test_caddytls/metadata.json", Bytes::from_static(b"garbage"))
            .await
            .unwrap();
        let err = s.site_exists("a.com").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Index {
                source: tlsb2_index::IndexError::Decode { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn list_sites_and_users() {
        let (_, s) = storage(true);
        s.store_site("b.com", &site()).await.unwrap();
        s.store_site("a.com", &site()).await.unwrap();
        s.store_user("me@a.com", &UserRecord::new("r", "k")).await.unwrap();
        assert_eq!(s.list_sites().await.unwrap(), ["a.com", "b.com"]);
        assert_eq!(s.list_users().await.unwrap(), ["me@a.com"]);
    }

    #[tokio::test]
    async fn truncate_only_touches_prefix() {
        let (bucket, s) = storage(true);
        bucket.upload("unrelated/file", Bytes::from_static(b"x")).await.unwrap();
        s.store_site("a.com", &site()).await.unwrap();
        s.store_site("a.com", &site()).await.unwrap();
        s.store_user("me@a.com", &UserRecord::new("r", "k")).await.unwrap();

        let deleted = s.truncate().await.unwrap();
        // Two site versions, one user, three index write-backs.
        assert_eq!(deleted, 6);
        assert_eq!(bucket.len(), 1);
        assert!(!s.site_exists("a.com").await.unwrap());

        s.store_site("b.com", &site()).await.unwrap();
        assert!(s.site_exists("b.com").await.unwrap());
    }

    #[tokio::test]
    async fn lock_through_storage() {
        let (_, s) = storage(false);
        assert!(s.try_lock("foobar.com").unwrap().is_none());
        assert!(s.try_lock("foobar.com").unwrap().is_some());
        s.unlock("foobar.com").unwrap();
        assert!(s.try_lock("foobar.com").unwrap().is_none());
        s.unlock("never-locked.com").unwrap();
    }

    #[tokio::test]
    async fn concurrent_stores_of_distinct_sites() {
        let (bucket, s) = storage(true);
        let s = Arc::new(s);
        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let s = Arc::clone(&s);
                tokio::spawn(async move {
                    s.store_site(&format!("d{i}.com"), &site()).await.unwrap();
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        let fresh = B2Storage::new(bucket.clone(), config(true));
        for i in 0..10 {
            assert!(fresh.site_exists(&format!("d{i}.com")).await.unwrap());
        }
    }

    #[test]
    fn missing_env_fails_before_network() {
        let result = B2Credentials::from_lookup(|_| None)
            .and_then(|creds| B2Storage::from_credentials(&creds, StorageConfig::default()));
        assert!(matches!(result, Err(StorageError::Config(_))));
    }

    #[test]
    fn builds_from_credentials() {
        let creds = B2Credentials::from_lookup(|name| match name {
            "B2_ACCOUNT_ID" => Some("id".into()),
            "B2_ACCOUNT_KEY" => Some("key".into()),
            "B2_BUCKET" => Some("certs".into()),
            _ => None,
        })
        .unwrap();
        let s = B2Storage::from_credentials(&creds, StorageConfig::default()).unwrap();
        assert!(s.uses_index());
        assert_eq!(s.namespace().prefix(), "caddytls");
    }
}
