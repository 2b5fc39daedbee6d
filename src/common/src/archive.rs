//! Archive target for records that are retired from the store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, PutPayload, path::Path};
use thiserror::Error;
use url::Url;

use crate::config::ArchiveConfig;
use crate::storage;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid archive target: {0}")]
    InvalidUrl(String),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("archive unavailable: {0}")]
    Unavailable(String),
}

/// Object key for an archived record.
pub fn archive_key(id: &str) -> String {
    format!("logs/{id}.json")
}

#[async_trait]
pub trait ArchiveTarget: Send + Sync {
    /// Store `body` under `key` in `bucket`, replacing any previous object.
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), ArchiveError>;
}

/// Archive backed by `object_store`, resolving one store per bucket.
pub struct ObjectStoreArchive {
    url: Url,
    region: String,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreArchive {
    pub fn new(config: &ArchiveConfig) -> Result<Self, ArchiveError> {
        let url = storage::parse_archive_url(&config.url)
            .map_err(|e| ArchiveError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            url,
            region: config.region.clone(),
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// The object store for `bucket`, created on first use.
    pub fn bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, ArchiveError> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let store = storage::create_bucket_store(&self.url, bucket, &self.region)
            .map_err(|e| ArchiveError::InvalidUrl(e.to_string()))?;
        stores.insert(bucket.to_string(), Arc::clone(&store));
        Ok(store)
    }
}

#[async_trait]
impl ArchiveTarget for ObjectStoreArchive {
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), ArchiveError> {
        let store = self.bucket(bucket)?;
        store.put(&Path::from(key), PutPayload::from(body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_archive() -> ObjectStoreArchive {
        ObjectStoreArchive::new(&ArchiveConfig {
            url: "memory://".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_archive_key() {
        assert_eq!(archive_key("doc-42"), "logs/doc-42.json");
    }

    #[tokio::test]
    async fn test_put_then_read_back() {
        let archive = memory_archive();
        let body = Bytes::from_static(br#"{"service":"auth"}"#);

        archive
            .put("audit", &archive_key("doc-1"), body.clone())
            .await
            .unwrap();

        let stored = archive
            .bucket("audit")
            .unwrap()
            .get(&Path::from("logs/doc-1.json"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored, body);
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let archive = memory_archive();
        archive
            .put("a", "logs/doc-1.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        let missing = archive
            .bucket("b")
            .unwrap()
            .get(&Path::from("logs/doc-1.json"))
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_file_archive_writes_under_bucket_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let archive = ObjectStoreArchive::new(&ArchiveConfig {
            url: format!("file://{}", temp_dir.path().display()),
            ..Default::default()
        })
        .unwrap();

        archive
            .put("cold", &archive_key("doc-9"), Bytes::from_static(b"{}"))
            .await
            .unwrap();

        assert!(temp_dir.path().join("cold/logs/doc-9.json").is_file());
    }

    #[tokio::test]
    async fn test_invalid_bucket_is_rejected() {
        let archive = memory_archive();
        let err = archive
            .put("", "logs/doc-1.json", Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidUrl(_)));
    }

    #[test]
    fn test_rejects_unsupported_url() {
        let result = ObjectStoreArchive::new(&ArchiveConfig {
            url: "ftp://example.com".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ArchiveError::InvalidUrl(_))));
    }
}
