//! Object storage layer
//!
//! Handlers talk to an [`ObjectStore`]; the concrete backend is picked at
//! startup from `STORAGE_PROVIDER`:
//! - `s3` - any S3-compatible bucket (AWS, R2, MinIO) via [`S3Store`]
//! - `memory` - process-local [`MemoryStore`], used for development and tests
//!
//! Every stored object carries an expiration instant. `get` never returns an
//! object whose expiration has passed, whether or not the backend has purged
//! it yet.

pub mod memory;
pub mod s3_client;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::config::StorageConfig;

pub use memory::MemoryStore;
pub use s3_client::S3Store;

/// Streaming object payload.
pub type ByteStream<'a> = BoxStream<'a, std::io::Result<Bytes>>;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 request failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("failed to stream object body: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage configuration: {0}")]
    Config(String),
}

/// Metadata written alongside an object.
#[derive(Debug, Clone)]
pub struct PutOptions {
    pub expire_at: DateTime<Utc>,
    pub content_type: Option<String>,
    pub original_filename: String,
}

/// An object read back from the store, body not yet consumed.
pub struct StoredObject {
    pub body: ByteStream<'static>,
    pub content_type: Option<String>,
    pub original_filename: Option<String>,
    pub expire_at: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

impl std::fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredObject")
            .field("content_type", &self.content_type)
            .field("original_filename", &self.original_filename)
            .field("expire_at", &self.expire_at)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: ByteStream<'_>, options: PutOptions) -> StorageResult<()>;

    /// Fetch the object under `key`. Absent and expired objects are both `None`.
    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// True once `expire_at` has been reached.
pub fn is_expired(expire_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expire_at
}

/// Build the store selected by `config.provider`.
pub fn create_store(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config.provider.as_str() {
        "s3" => Ok(Arc::new(S3Store::new(config)?)),
        "memory" => {
            let store = MemoryStore::new();
            store.spawn_sweeper(Duration::from_secs(config.memory_sweep_interval_secs));
            Ok(Arc::new(store))
        }
        other => Err(StorageError::Config(format!(
            "unknown storage provider {:?} (expected \"s3\" or \"memory\")",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_inclusive() {
        let now = Utc::now();
        assert!(is_expired(now, now));
        assert!(is_expired(now - chrono::Duration::seconds(1), now));
        assert!(!is_expired(now + chrono::Duration::seconds(1), now));
    }

    #[tokio::test]
    async fn test_create_memory_store() {
        let config = StorageConfig {
            provider: "memory".to_string(),
            ..StorageConfig::default()
        };
        let store = create_store(&config).unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = StorageConfig {
            provider: "ftp".to_string(),
            ..StorageConfig::default()
        };
        let err = create_store(&config).err().unwrap();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn test_s3_requires_bucket() {
        let config = StorageConfig::default();
        let err = create_store(&config).err().unwrap();
        assert!(matches!(err, StorageError::Config(_)));
    }
}
