//! S3-compatible backend built on the `object_store` crate.
//!
//! Backblaze B2 exposes an S3 API next to its native one, so the same client
//! reaches B2, AWS S3 and MinIO. Object ids are the ETags the service returns.
//! The S3 API only lists current objects, so `list(.., versions = true)`
//! returns the same entries as a plain listing.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{GetOptions, ObjectMeta, ObjectStore, PutPayload};
use tlsb2_types::{FileInfo, ObjectId};
use tracing::debug;

use crate::error::{BucketError, BucketResult};
use crate::traits::BucketClient;

/// Connection settings for an S3-compatible service.
#[derive(Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// [`BucketClient`] over any `object_store` backend.
pub struct S3Bucket {
    store: Arc<dyn ObjectStore>,
}

impl S3Bucket {
    /// Build a client for the configured service. No request is sent.
    pub fn new(config: &S3Config) -> BucketResult<Self> {
        let store = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_region(&config.region)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .build()
            .map_err(map_err)?;
        debug!(endpoint = %config.endpoint, bucket = %config.bucket, "built S3 client");
        Ok(Self::from_store(Arc::new(store)))
    }

    /// Wrap an already configured `object_store` backend.
    pub fn from_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    async fn check_id(&self, name: &str, id: &ObjectId) -> BucketResult<FileInfo> {
        let info = self.info_by_name(name).await?;
        if &info.id != id {
            return Err(BucketError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(info)
    }
}

/// Object key for `name`, kept verbatim.
///
/// `Path::from` percent-encodes characters such as `~` and `{`, and listings
/// would then hand back the encoded form instead of the name that was
/// written. `Path::parse` only validates.
fn object_path(name: &str) -> BucketResult<Path> {
    Path::parse(name).map_err(|e| BucketError::InvalidName {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn object_id(meta: &ObjectMeta) -> ObjectId {
    match &meta.e_tag {
        Some(tag) => ObjectId::new(tag.clone()),
        None => ObjectId::new(format!("{}@{}", meta.location, meta.last_modified.timestamp_micros())),
    }
}

fn file_info(meta: &ObjectMeta) -> FileInfo {
    FileInfo {
        id: object_id(meta),
        name: meta.location.to_string(),
        size: meta.size as u64,
        uploaded_at: meta.last_modified,
    }
}

fn map_err(err: object_store::Error) -> BucketError {
    match err {
        object_store::Error::NotFound { path, .. } => BucketError::NotFound { name: path },
        object_store::Error::Precondition { path, .. } => BucketError::NotFound { name: path },
        other => BucketError::Backend(other.to_string()),
    }
}

#[async_trait]
impl BucketClient for S3Bucket {
    async fn upload(&self, name: &str, data: Bytes) -> BucketResult<FileInfo> {
        let size = data.len() as u64;
        let result = self
            .store
            .put(&object_path(name)?, PutPayload::from(data))
            .await
            .map_err(map_err)?;
        let id = result
            .e_tag
            .map(ObjectId::new)
            .ok_or_else(|| BucketError::InvalidId(format!("no ETag returned for {name}")))?;
        Ok(FileInfo {
            id,
            name: name.to_string(),
            size,
            uploaded_at: Utc::now(),
        })
    }

    async fn download_by_name(&self, name: &str) -> BucketResult<Bytes> {
        let result = self.store.get(&object_path(name)?).await.map_err(map_err)?;
        result.bytes().await.map_err(map_err)
    }

    async fn download_by_id(&self, name: &str, id: &ObjectId) -> BucketResult<Bytes> {
        self.check_id(name, id).await?;
        let options = GetOptions {
            if_match: Some(id.as_str().to_string()),
            ..Default::default()
        };
        let result = self
            .store
            .get_opts(&object_path(name)?, options)
            .await
            .map_err(map_err)?;
        result.bytes().await.map_err(map_err)
    }

    async fn info_by_name(&self, name: &str) -> BucketResult<FileInfo> {
        let meta = self.store.head(&object_path(name)?).await.map_err(map_err)?;
        Ok(file_info(&meta))
    }

    async fn info_by_id(&self, name: &str, id: &ObjectId) -> BucketResult<FileInfo> {
        self.check_id(name, id).await
    }

    async fn list(&self, prefix: &str, _versions: bool) -> BucketResult<Vec<FileInfo>> {
        let trimmed = prefix.trim_end_matches('/');
        let location = match trimmed {
            "" => None,
            trimmed => Some(object_path(trimmed)?),
        };
        let metas: Vec<ObjectMeta> = self
            .store
            .list(location.as_ref())
            .try_collect()
            .await
            .map_err(map_err)?;

        let mut files: Vec<FileInfo> = metas
            .iter()
            .map(file_info)
            .filter(|f| f.name.starts_with(prefix))
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn delete(&self, name: &str, id: &ObjectId) -> BucketResult<()> {
        self.check_id(name, id).await?;
        self.store.delete(&object_path(name)?).await.map_err(map_err)
    }
}

impl std::fmt::Debug for S3Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Bucket")
            .field("store", &self.store.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn bucket() -> S3Bucket {
        S3Bucket::from_store(Arc::new(InMemory::new()))
    }

    #[tokio::test]
    async fn upload_then_read_back() {
        let b = bucket();
        let info = b.upload("caddytls/domain/a.com", Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(info.size, 2);

        let head = b.info_by_name("caddytls/domain/a.com").await.unwrap();
        assert_eq!(head.id, info.id);
        assert_eq!(head.name, "caddytls/domain/a.com");

        let body = b.download_by_id("caddytls/domain/a.com", &info.id).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn stale_id_is_not_found() {
        let b = bucket();
        let old = b.upload("k", Bytes::from_static(b"1")).await.unwrap();
        let new = b.upload("k", Bytes::from_static(b"2")).await.unwrap();
        assert_ne!(old.id, new.id);

        assert!(b.info_by_id("k", &old.id).await.unwrap_err().is_not_found());
        assert!(b.download_by_id("k", &old.id).await.unwrap_err().is_not_found());
        assert_eq!(b.download_by_name("k").await.unwrap(), Bytes::from_static(b"2"));
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let b = bucket();
        b.upload("caddytls/user/b@x.com", Bytes::from_static(b"1")).await.unwrap();
        b.upload("caddytls/user/a@x.com", Bytes::from_static(b"1")).await.unwrap();
        b.upload("caddytls/domain/x.com", Bytes::from_static(b"1")).await.unwrap();
        b.upload("other/file", Bytes::from_static(b"1")).await.unwrap();

        let users = b.list("caddytls/user/", false).await.unwrap();
        let names: Vec<_> = users.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["caddytls/user/a@x.com", "caddytls/user/b@x.com"]);

        assert_eq!(b.list("", true).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn delete_then_missing() {
        let b = bucket();
        let info = b.upload("k", Bytes::from_static(b"1")).await.unwrap();
        b.delete("k", &info.id).await.unwrap();
        assert!(b.info_by_name("k").await.unwrap_err().is_not_found());
        assert!(b.download_by_name("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn names_are_listed_verbatim() {
        let b = bucket();
        let name = "caddytls/user/first~tag{x}|y#z^`@x.com";
        b.upload(name, Bytes::from_static(b"1")).await.unwrap();

        let listed = b.list("caddytls/user/", false).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, name);
        assert_eq!(b.info_by_name(name).await.unwrap().name, name);
        assert_eq!(b.download_by_name(name).await.unwrap(), Bytes::from_static(b"1"));
    }

    #[tokio::test]
    async fn unusable_name_is_rejected() {
        let b = bucket();
        let err = b.upload("caddytls//a.com", Bytes::from_static(b"1")).await.unwrap_err();
        assert!(matches!(err, BucketError::InvalidName { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn config_debug_redacts_secret() {
        let config = S3Config {
            endpoint: "https://s3.us-west-004.backblazeb2.com".into(),
            region: "us-west-004".into(),
            bucket: "certs".into(),
            access_key_id: "key-id".into(),
            secret_access_key: "super-secret".into(),
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("key-id"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn builds_without_network() {
        let config = S3Config {
            endpoint: "https://s3.us-west-004.backblazeb2.com".into(),
            region: "us-west-004".into(),
            bucket: "certs".into(),
            access_key_id: "key-id".into(),
            secret_access_key: "secret".into(),
        };
        assert!(S3Bucket::new(&config).is_ok());
    }
}
