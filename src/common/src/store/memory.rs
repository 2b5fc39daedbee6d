use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{LogStore, PageCursor, StoreError, StoredRecord};
use crate::model::LogEntry;

/// In-memory document store.
///
/// Used when no external store is configured and as the store in tests; it
/// records how often each operation was invoked and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLogStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    documents: BTreeMap<u64, Document>,
    write_calls: usize,
    delete_calls: Vec<String>,
    fail_writes: bool,
    fail_deletes: HashSet<String>,
}

#[derive(Debug)]
struct Document {
    service: String,
    timestamp: String,
    body: Bytes,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make deletes of `id` fail with a non-`NotFound` error.
    pub fn fail_delete(&self, id: &str) {
        self.lock().fail_deletes.insert(id.to_string());
    }

    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        parse_id(id).is_some_and(|key| self.lock().documents.contains_key(&key))
    }

    /// Number of `write` invocations, including failed ones.
    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    /// Ids passed to `delete`, in call order, including failed ones.
    pub fn delete_calls(&self) -> Vec<String> {
        self.lock().delete_calls.clone()
    }

    /// Decode every stored document.
    pub fn documents(&self) -> Vec<LogEntry> {
        self.lock()
            .documents
            .values()
            .filter_map(|doc| serde_json::from_slice(&doc.body).ok())
            .collect()
    }
}

fn format_id(key: u64) -> String {
    format!("doc-{key}")
}

fn parse_id(id: &str) -> Option<u64> {
    id.strip_prefix("doc-")?.parse().ok()
}

fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn write(&self, entry: &LogEntry) -> Result<String, StoreError> {
        let body = Bytes::from(entry.to_json()?);

        let mut inner = self.lock();
        inner.write_calls += 1;
        if inner.fail_writes {
            return Err(StoreError::Unavailable(
                "in-memory store is rejecting writes".to_string(),
            ));
        }

        inner.next_id += 1;
        let key = inner.next_id;
        inner.documents.insert(
            key,
            Document {
                service: entry.service.clone(),
                timestamp: entry.timestamp.clone(),
                body,
            },
        );
        Ok(format_id(key))
    }

    async fn query_expired(
        &self,
        service: &str,
        before: DateTime<Utc>,
        after: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let inner = self.lock();
        let after = after.map(|cursor| (cursor.timestamp, parse_id(&cursor.id).unwrap_or(0)));

        let mut expired: Vec<(DateTime<Utc>, u64, &Document)> = inner
            .documents
            .iter()
            .filter(|(_, doc)| doc.service == service)
            .filter_map(|(key, doc)| {
                let ts = parse_timestamp(&doc.timestamp)?;
                (ts < before).then_some((ts, *key, doc))
            })
            .filter(|(ts, key, _)| after.is_none_or(|position| (*ts, *key) > position))
            .collect();
        expired.sort_by_key(|(ts, key, _)| (*ts, *key));

        Ok(expired
            .into_iter()
            .take(page_size)
            .map(|(ts, key, doc)| StoredRecord {
                id: format_id(key),
                timestamp: ts,
                body: doc.body.clone(),
            })
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.delete_calls.push(id.to_string());

        if inner.fail_deletes.contains(id) {
            return Err(StoreError::Unavailable(format!(
                "in-memory store is rejecting deletes of {id}"
            )));
        }

        parse_id(id)
            .and_then(|key| inner.documents.remove(&key))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
