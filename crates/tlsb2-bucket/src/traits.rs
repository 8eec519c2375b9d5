use async_trait::async_trait;
use bytes::Bytes;
use tlsb2_types::{FileInfo, ObjectId};

use crate::error::BucketResult;

/// Narrow client interface to one bucket of a remote object store.
///
/// Implementations must satisfy these invariants:
/// - Uploading under an existing name creates a new version with a new id;
///   by-name reads always see the most recent version.
/// - Id-based calls address one exact version. They take the object name
///   as well, since some services can only resolve an id within its name.
/// - A missing object is reported as an error for which
///   [`BucketError::is_not_found`](crate::BucketError::is_not_found) holds.
/// - The client owns no domain state; it is a facade over the service.
#[async_trait]
pub trait BucketClient: Send + Sync {
    /// Create or overwrite the object `name`, returning the new version's info.
    async fn upload(&self, name: &str, data: Bytes) -> BucketResult<FileInfo>;

    /// Download the latest version of `name`.
    async fn download_by_name(&self, name: &str) -> BucketResult<Bytes>;

    /// Download the exact version `id` of `name`.
    async fn download_by_id(&self, name: &str, id: &ObjectId) -> BucketResult<Bytes>;

    /// Metadata of the latest version of `name`.
    async fn info_by_name(&self, name: &str) -> BucketResult<FileInfo>;

    /// Metadata of the exact version `id` of `name`.
    async fn info_by_id(&self, name: &str, id: &ObjectId) -> BucketResult<FileInfo>;

    /// List objects whose name starts with `prefix`.
    ///
    /// With `versions == false` only the latest version of each name is
    /// returned, sorted by name. With `versions == true` every stored version
    /// is returned, sorted by name and then newest first.
    async fn list(&self, prefix: &str, versions: bool) -> BucketResult<Vec<FileInfo>>;

    /// Delete version `id` of `name`.
    async fn delete(&self, name: &str, id: &ObjectId) -> BucketResult<()>;
}
