use std::sync::Arc;

use bytes::Bytes;
use tlsb2_bucket::{BucketClient, RetryPolicy};
use tlsb2_types::{Kind, Namespace, ObjectId};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{IndexError, IndexResult};
use crate::index::MetadataIndex;

/// Whether the index document has been read in this process yet.
#[derive(Debug)]
enum IndexState {
    NotLoaded,
    Loaded(MetadataIndex),
}

#[derive(Debug)]
struct Guarded {
    state: IndexState,
    /// Bumped on every in-memory change.
    generation: u64,
}

/// Process-local copy of the [`MetadataIndex`].
///
/// The document is read at most once per cache, on first use. A missing
/// document loads as an empty index. Every change is applied in memory and
/// then written back to the bucket; write-backs are ordered by generation so
/// an older snapshot never overwrites a newer one.
pub struct IndexCache {
    client: Arc<dyn BucketClient>,
    key: String,
    retry: RetryPolicy,
    guarded: Mutex<Guarded>,
    /// Generation of the last snapshot written to the bucket.
    persisted: Mutex<u64>,
}

impl IndexCache {
    pub fn new(client: Arc<dyn BucketClient>, namespace: &Namespace, retry: RetryPolicy) -> Self {
        Self {
            client,
            key: namespace.metadata_key(),
            retry,
            guarded: Mutex::new(Guarded {
                state: IndexState::NotLoaded,
                generation: 0,
            }),
            persisted: Mutex::new(0),
        }
    }

    /// Object key of the index document.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn is_loaded(&self) -> bool {
        matches!(self.guarded.lock().await.state, IndexState::Loaded(_))
    }

    async fn fetch(&self) -> IndexResult<MetadataIndex> {
        match self.client.download_by_name(&self.key).await {
            Ok(body) => {
                let index = serde_json::from_slice(&body).map_err(|source| IndexError::Decode {
                    key: self.key.clone(),
                    source,
                })?;
                Ok(index)
            }
            Err(err) if err.is_not_found() => {
                debug!(key = %self.key, "no index document, starting empty");
                Ok(MetadataIndex::new())
            }
            Err(source) => Err(IndexError::Download {
                key: self.key.clone(),
                source,
            }),
        }
    }

    /// Return the loaded index, reading the document if this is the first use.
    async fn ensure_loaded<'a>(&self, guarded: &'a mut Guarded) -> IndexResult<&'a mut MetadataIndex> {
        if let IndexState::NotLoaded = guarded.state {
            let index = self.fetch().await?;
            info!(key = %self.key, entries = index.len(), "loaded metadata index");
            guarded.state = IndexState::Loaded(index);
        }
        match &mut guarded.state {
            IndexState::Loaded(index) => Ok(index),
            IndexState::NotLoaded => unreachable!("index state was just loaded"),
        }
    }

    /// Load the index document if it has not been loaded yet.
    pub async fn load(&self) -> IndexResult<()> {
        let mut guarded = self.guarded.lock().await;
        self.ensure_loaded(&mut guarded).await?;
        Ok(())
    }

    /// Current object id recorded for `identity`.
    pub async fn lookup(&self, kind: Kind, identity: &str) -> IndexResult<Option<ObjectId>> {
        let mut guarded = self.guarded.lock().await;
        let index = self.ensure_loaded(&mut guarded).await?;
        Ok(index.get(kind, identity).cloned())
    }

    /// Copy of the whole index.
    pub async fn snapshot(&self) -> IndexResult<MetadataIndex> {
        let mut guarded = self.guarded.lock().await;
        Ok(self.ensure_loaded(&mut guarded).await?.clone())
    }

    /// Record `id` as the current object of `identity` and persist the index.
    pub async fn record(&self, kind: Kind, identity: &str, id: ObjectId) -> IndexResult<()> {
        self.mutate(|index| {
            index.insert(kind, identity, id);
        })
        .await
    }

    /// Drop `identity` from the index and persist the index.
    pub async fn forget(&self, kind: Kind, identity: &str) -> IndexResult<()> {
        self.mutate(|index| {
            index.remove(kind, identity);
        })
        .await
    }

    /// Replace the whole index and persist it.
    pub async fn replace(&self, replacement: MetadataIndex) -> IndexResult<()> {
        self.mutate(|index| *index = replacement).await
    }

    /// Empty the in-memory index without writing it.
    ///
    /// Used after the bucket contents, index document included, were removed.
    pub async fn reset(&self) {
        let mut guarded = self.guarded.lock().await;
        guarded.state = IndexState::Loaded(MetadataIndex::new());
        guarded.generation += 1;
    }

    async fn mutate<F>(&self, apply: F) -> IndexResult<()>
    where
        F: FnOnce(&mut MetadataIndex),
    {
        let (generation, body) = {
            let mut guarded = self.guarded.lock().await;
            let index = self.ensure_loaded(&mut guarded).await?;
            apply(index);
            let body = serde_json::to_vec(index).map_err(IndexError::Encode)?;
            guarded.generation += 1;
            (guarded.generation, Bytes::from(body))
        };
        self.persist(generation, body).await
    }

    async fn persist(&self, generation: u64, body: Bytes) -> IndexResult<()> {
        let mut persisted = self.persisted.lock().await;
        if *persisted >= generation {
            debug!(generation, persisted = *persisted, "newer index already written");
            return Ok(());
        }

        self.retry
            .run("index/upload", || self.client.upload(&self.key, body.clone()))
            .await
            .map_err(|e| IndexError::Upload {
                key: self.key.clone(),
                attempts: e.attempts,
                source: e.last,
            })?;
        *persisted = generation;
        debug!(key = %self.key, generation, "persisted metadata index");
        Ok(())
    }
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache").field("key", &self.key).finish()
    }
}
