use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{stream, StreamExt, TryStreamExt};
use tokio::sync::RwLock;
use tracing::debug;

use super::{is_expired, ByteStream, ObjectStore, PutOptions, StorageResult, StoredObject};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    options: PutOptions,
}

/// Process-local object store. Objects are buffered in full.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, MemoryObject>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently held, expired or not.
    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Drop every expired object. Returns how many were removed.
    #[cfg(test)]
    pub(crate) async fn purge_expired(&self) -> usize {
        purge(&self.inner).await
    }

    /// Periodically purge expired objects until the store is dropped.
    pub fn spawn_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let inner: Weak<RwLock<HashMap<String, MemoryObject>>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(strong) = inner.upgrade() else {
                    break;
                };
                let purged = purge(&strong).await;
                if purged > 0 {
                    debug!(purged, "Swept expired objects from memory store");
                }
            }
        })
    }
}

async fn purge(inner: &RwLock<HashMap<String, MemoryObject>>) -> usize {
    let now = Utc::now();
    let mut guard = inner.write().await;
    let before = guard.len();
    guard.retain(|_, object| !is_expired(object.options.expire_at, now));
    before - guard.len()
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, mut body: ByteStream<'_>, options: PutOptions) -> StorageResult<()> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.try_next().await? {
            buffer.extend_from_slice(&chunk);
        }

        let object = MemoryObject {
            data: buffer.freeze(),
            options,
        };
        self.inner.write().await.insert(key.to_string(), object);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        let object = {
            let guard = self.inner.read().await;
            match guard.get(key) {
                Some(object) => object.clone(),
                None => return Ok(None),
            }
        };

        if is_expired(object.options.expire_at, Utc::now()) {
            self.inner.write().await.remove(key);
            debug!(key, "Purged expired object on read");
            return Ok(None);
        }

        let size = object.data.len() as u64;
        let chunks: Vec<std::io::Result<Bytes>> = object
            .data
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(object.data.slice_ref(chunk)))
            .collect();

        Ok(Some(StoredObject {
            body: stream::iter(chunks).boxed(),
            content_type: object.options.content_type,
            original_filename: Some(object.options.original_filename),
            expire_at: Some(object.options.expire_at),
            size: Some(size),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn options(ttl_secs: i64, filename: &str) -> PutOptions {
        PutOptions {
            expire_at: Utc::now() + ChronoDuration::seconds(ttl_secs),
            content_type: Some("text/plain".to_string()),
            original_filename: filename.to_string(),
        }
    }

    fn body_of(data: &'static [u8]) -> ByteStream<'static> {
        stream::iter(vec![Ok(Bytes::from_static(data))]).boxed()
    }

    async fn read_all(object: StoredObject) -> Vec<u8> {
        object
            .body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        store
            .put("k1/notes.txt", body_of(b"hello world"), options(3600, "notes.txt"))
            .await
            .unwrap();

        let object = store.get("k1/notes.txt").await.unwrap().unwrap();
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));
        assert_eq!(object.original_filename.as_deref(), Some("notes.txt"));
        assert_eq!(object.size, Some(11));
        assert_eq!(read_all(object).await, b"hello world");
    }

    #[tokio::test]
    async fn test_large_body_is_chunked() {
        let store = MemoryStore::new();
        let data = vec![7u8; CHUNK_SIZE * 2 + 10];
        let body = stream::iter(vec![Ok(Bytes::from(data.clone()))]).boxed();
        store.put("big", body, options(60, "big.bin")).await.unwrap();

        let object = store.get("big").await.unwrap().unwrap();
        let chunks: Vec<_> = object.body.collect().await;
        assert_eq!(chunks.len(), 3);
        let joined: Vec<u8> = chunks
            .into_iter()
            .flat_map(|c| c.unwrap().to_vec())
            .collect();
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_object_is_hidden_and_removed() {
        let store = MemoryStore::new();
        store
            .put("old", body_of(b"stale"), options(-1, "old.txt"))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);

        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_objects() {
        let store = MemoryStore::new();
        store.put("live", body_of(b"a"), options(3600, "a")).await.unwrap();
        store.put("dead", body_of(b"b"), options(-10, "b")).await.unwrap();

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_body_stream_stores_nothing() {
        let store = MemoryStore::new();
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ])
        .boxed();

        assert!(store.put("broken", body, options(60, "x")).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_in_background() {
        let store = MemoryStore::new();
        store.put("dead", body_of(b"b"), options(-10, "b")).await.unwrap();
        let handle = store.spawn_sweeper(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(store.is_empty().await);

        drop(store);
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(handle.is_finished());
    }
}
