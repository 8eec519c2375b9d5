use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use tlsb2_types::{FileInfo, ObjectId};
use uuid::Uuid;

use crate::error::{BucketError, BucketResult};
use crate::traits::BucketClient;

#[derive(Clone)]
struct Version {
    info: FileInfo,
    data: Bytes,
}

#[derive(Default)]
struct Inner {
    /// Versions per name, oldest first.
    objects: BTreeMap<String, Vec<Version>>,
    last_upload: Option<DateTime<Utc>>,
}

/// In-memory, versioned bucket.
///
/// Intended for tests and embedding. Behaves like a versioned object store:
/// every upload adds a version with a fresh UUIDv7 id, and upload timestamps
/// strictly increase in upload order. Failures can be injected to exercise
/// retry paths.
pub struct InMemoryBucket {
    inner: RwLock<Inner>,
    failing_uploads: AtomicU32,
    failing_lists: AtomicU32,
}

impl InMemoryBucket {
    /// Create a new empty bucket.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            failing_uploads: AtomicU32::new(0),
            failing_lists: AtomicU32::new(0),
        }
    }

    /// Make the next `n` uploads fail with a 503 status.
    pub fn fail_next_uploads(&self, n: u32) {
        self.failing_uploads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` listings fail with a 500 status.
    pub fn fail_next_lists(&self, n: u32) {
        self.failing_lists.store(n, Ordering::SeqCst);
    }

    /// Number of names with at least one stored version.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.objects.len()).unwrap_or(0)
    }

    /// Returns `true` if no object is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored versions of `name`.
    pub fn version_count(&self, name: &str) -> usize {
        self.inner
            .read()
            .map(|inner| inner.objects.get(name).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn read_inner(&self) -> BucketResult<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| BucketError::Backend(format!("lock poisoned: {e}")))
    }

    fn write_inner(&self) -> BucketResult<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| BucketError::Backend(format!("lock poisoned: {e}")))
    }

    fn latest(&self, name: &str) -> BucketResult<Version> {
        let inner = self.read_inner()?;
        inner
            .objects
            .get(name)
            .and_then(|versions| versions.last())
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    fn exact(&self, name: &str, id: &ObjectId) -> BucketResult<Version> {
        let inner = self.read_inner()?;
        inner
            .objects
            .get(name)
            .and_then(|versions| versions.iter().find(|v| &v.info.id == id))
            .cloned()
            .ok_or_else(|| not_found(name))
    }
}

fn not_found(name: &str) -> BucketError {
    BucketError::NotFound {
        name: name.to_string(),
    }
}

impl Default for InMemoryBucket {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BucketClient for InMemoryBucket {
    async fn upload(&self, name: &str, data: Bytes) -> BucketResult<FileInfo> {
        if Self::take_failure(&self.failing_uploads) {
            return Err(BucketError::Status {
                status: 503,
                message: "service unavailable (injected)".into(),
            });
        }

        let mut inner = self.write_inner()?;
        let now = Utc::now();
        let uploaded_at = match inner.last_upload {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        inner.last_upload = Some(uploaded_at);

        let info = FileInfo {
            id: ObjectId::new(Uuid::now_v7().to_string()),
            name: name.to_string(),
            size: data.len() as u64,
            uploaded_at,
        };
        inner
            .objects
            .entry(name.to_string())
            .or_default()
            .push(Version {
                info: info.clone(),
                data,
            });
        Ok(info)
    }

    async fn download_by_name(&self, name: &str) -> BucketResult<Bytes> {
        Ok(self.latest(name)?.data)
    }

    async fn download_by_id(&self, name: &str, id: &ObjectId) -> BucketResult<Bytes> {
        Ok(self.exact(name, id)?.data)
    }

    async fn info_by_name(&self, name: &str) -> BucketResult<FileInfo> {
        Ok(self.latest(name)?.info)
    }

    async fn info_by_id(&self, name: &str, id: &ObjectId) -> BucketResult<FileInfo> {
        Ok(self.exact(name, id)?.info)
    }

    async fn list(&self, prefix: &str, versions: bool) -> BucketResult<Vec<FileInfo>> {
        if Self::take_failure(&self.failing_lists) {
            return Err(BucketError::Status {
                status: 500,
                message: "internal error (injected)".into(),
            });
        }

        let inner = self.read_inner()?;
        let matching = inner
            .objects
            .iter()
            .filter(|(name, _)| name.starts_with(prefix));

        let files = if versions {
            matching
                .flat_map(|(_, vs)| vs.iter().rev().map(|v| v.info.clone()))
                .collect()
        } else {
            matching
                .filter_map(|(_, vs)| vs.last().map(|v| v.info.clone()))
                .collect()
        };
        Ok(files)
    }

    async fn delete(&self, name: &str, id: &ObjectId) -> BucketResult<()> {
        let mut inner = self.write_inner()?;
        let versions = inner.objects.get_mut(name).ok_or_else(|| not_found(name))?;
        let pos = versions
            .iter()
            .position(|v| &v.info.id == id)
            .ok_or_else(|| not_found(name))?;
        versions.remove(pos);
        if versions.is_empty() {
            inner.objects.remove(name);
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBucket")
            .field("object_count", &self.len())
            .finish()
    }
}
