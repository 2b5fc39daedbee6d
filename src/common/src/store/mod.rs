//! Document store seam.
//!
//! The store is an opaque search/document service. The pipeline needs three
//! operations from it: write a new document, page through documents of one
//! service older than a cutoff, and delete a document by id.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};
use crate::model::LogEntry;

pub mod elasticsearch;
pub mod memory;

pub use elasticsearch::ElasticsearchStore;
pub use memory::InMemoryLogStore;

/// A persisted document as returned by a retention query.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Store-assigned identifier.
    pub id: String,
    /// Timestamp the store sorted the document by.
    pub timestamp: DateTime<Utc>,
    /// JSON document body as read from the store.
    pub body: Bytes,
}

impl StoredRecord {
    /// Position just past this record in `(timestamp, id)` order.
    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            timestamp: self.timestamp,
            id: self.id.clone(),
        }
    }
}

/// Resume point for [`LogStore::query_expired`]. Only documents ordered
/// strictly after `(timestamp, id)` are returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub timestamp: DateTime<Utc>,
    pub id: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(String),

    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode or decode document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid store URL '{0}'")]
    InvalidUrl(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("search hit {0} carries no sort position")]
    MissingSortPosition(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist an entry and return the identifier the store assigned.
    async fn write(&self, entry: &LogEntry) -> Result<String, StoreError>;

    /// Return at most `page_size` documents of `service` whose timestamp is
    /// strictly before `before`, ordered by `(timestamp, id)` and starting
    /// after `after` when given.
    async fn query_expired(
        &self,
        service: &str,
        before: DateTime<Utc>,
        after: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    /// Delete a document. Missing documents yield [`StoreError::NotFound`].
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Create a store from configuration.
pub fn create_log_store(config: &StoreConfig) -> Result<Arc<dyn LogStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryLogStore::new())),
        StoreBackend::Elasticsearch => Ok(Arc::new(ElasticsearchStore::new(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_store() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..Default::default()
        };
        assert!(create_log_store(&config).is_ok());
    }

    #[test]
    fn test_create_elasticsearch_store_rejects_bad_url() {
        let config = StoreConfig {
            backend: StoreBackend::Elasticsearch,
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_log_store(&config),
            Err(StoreError::InvalidUrl(_))
        ));
    }
}
