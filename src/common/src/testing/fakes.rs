use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::archive::{ArchiveError, ArchiveTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedObject {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
}

#[derive(Default)]
struct Inner {
    objects: Vec<ArchivedObject>,
    failing_keys: HashSet<String>,
    fail_all: bool,
}

/// Archive that records every successful put and fails on request.
#[derive(Clone, Default)]
pub struct RecordingArchive {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingArchive {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_key(&self, key: impl Into<String>) {
        self.lock().failing_keys.insert(key.into());
    }

    pub fn fail_all(&self, fail: bool) {
        self.lock().fail_all = fail;
    }

    pub fn objects(&self) -> Vec<ArchivedObject> {
        self.lock().objects.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.iter().map(|o| o.key.clone()).collect()
    }

    pub fn put_count(&self) -> usize {
        self.lock().objects.len()
    }
}

#[async_trait]
impl ArchiveTarget for RecordingArchive {
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), ArchiveError> {
        let mut inner = self.lock();
        if inner.fail_all || inner.failing_keys.contains(key) {
            return Err(ArchiveError::Unavailable(format!(
                "injected failure for {bucket}/{key}"
            )));
        }

        inner.objects.push(ArchivedObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
        });
        Ok(())
    }
}
