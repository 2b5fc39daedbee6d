//! Retention Scheduler
//!
//! Finds expired records per service, archives them when the service's
//! policy asks for it, then deletes them from the store.
//!
//! ## Safety Guarantees
//!
//! - A record whose archive write failed is never deleted
//! - Only one pass per service runs at a time
//! - Dry-run mode selects and logs without archiving or deleting
//! - Deleting a record that is already gone is not an error, so an
//!   interrupted run can simply be restarted

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use common::archive::{ArchiveTarget, archive_key};
use common::config::RetentionSettings;
use common::store::{LogStore, PageCursor, StoredRecord};

use crate::config::{RetentionPolicies, RetentionPolicy};
use crate::metrics::RetentionMetrics;
use crate::policy::{RetentionCutoff, RetentionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub page_size: usize,
    pub max_pages: usize,
    pub dry_run: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&RetentionSettings::default())
    }
}

impl From<&RetentionSettings> for SchedulerOptions {
    fn from(settings: &RetentionSettings) -> Self {
        Self {
            page_size: settings.page_size.max(1),
            max_pages: settings.max_pages.max(1),
            dry_run: settings.dry_run,
        }
    }
}

/// Result of a retention pass for a single service
#[derive(Debug, Clone, Default)]
pub struct ServiceRetentionResult {
    pub service: String,
    pub cutoff: Option<DateTime<Utc>>,
    pub pages: usize,
    pub selected: usize,
    pub archived: usize,
    pub deleted: usize,
    pub archive_failures: usize,
    pub delete_failures: usize,
    /// Another pass for this service was already running
    pub skipped: bool,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

impl ServiceRetentionResult {
    fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.archive_failures == 0 && self.delete_failures == 0
    }
}

/// Result of a retention run across all configured services
#[derive(Debug, Clone)]
pub struct RetentionRunResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub dry_run: bool,
    pub services: Vec<ServiceRetentionResult>,
}

impl RetentionRunResult {
    pub fn service(&self, service: &str) -> Option<&ServiceRetentionResult> {
        self.services.iter().find(|r| r.service == service)
    }

    pub fn total_deleted(&self) -> usize {
        self.services.iter().map(|r| r.deleted).sum()
    }

    pub fn total_archived(&self) -> usize {
        self.services.iter().map(|r| r.archived).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.services
            .iter()
            .map(|r| r.archive_failures + r.delete_failures + r.errors.len())
            .sum()
    }
}

/// Removes the service from the in-flight set when the pass ends.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    service: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.service);
    }
}

pub struct RetentionScheduler {
    store: Arc<dyn LogStore>,
    archive: Arc<dyn ArchiveTarget>,
    options: SchedulerOptions,
    metrics: RetentionMetrics,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RetentionScheduler {
    pub fn new(
        store: Arc<dyn LogStore>,
        archive: Arc<dyn ArchiveTarget>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            store,
            archive,
            options,
            metrics: RetentionMetrics::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn metrics(&self) -> &RetentionMetrics {
        &self.metrics
    }

    pub fn options(&self) -> SchedulerOptions {
        self.options
    }

    pub fn is_in_flight(&self, service: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(service)
    }

    fn try_claim(&self, service: &str) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(service.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            service: service.to_string(),
        })
    }

    /// Run one retention pass for every configured service.
    pub async fn run(&self, policies: &RetentionPolicies) -> RetentionRunResult {
        self.run_at(policies, Utc::now()).await
    }

    /// Run one retention pass with `now` as the reference time.
    pub async fn run_at(&self, policies: &RetentionPolicies, now: DateTime<Utc>) -> RetentionRunResult {
        let run_id = format!("retention_{}", Utc::now().timestamp_millis());
        let started_at = Utc::now();

        info!(
            run_id = %run_id,
            services = policies.len(),
            dry_run = self.options.dry_run,
            "Starting retention run"
        );

        let mut services = Vec::with_capacity(policies.len());
        for (service, policy) in policies.iter() {
            let result = self.enforce_service(service, policy, now).await;
            if !result.is_clean() {
                warn!(
                    service = %service,
                    archive_failures = result.archive_failures,
                    delete_failures = result.delete_failures,
                    errors = result.errors.len(),
                    "Service retention completed with failures"
                );
            }
            services.push(result);
        }

        let completed_at = Utc::now();
        let result = RetentionRunResult {
            run_id,
            started_at,
            completed_at,
            dry_run: self.options.dry_run,
            services,
        };

        info!(
            run_id = %result.run_id,
            deleted = result.total_deleted(),
            archived = result.total_archived(),
            failures = result.total_failures(),
            duration_ms = (completed_at - started_at).num_milliseconds(),
            "Retention run completed"
        );

        result
    }

    /// Run the retention pass for a single service.
    pub async fn enforce_service(
        &self,
        service: &str,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> ServiceRetentionResult {
        let mut result = ServiceRetentionResult::new(service);

        let Some(_guard) = self.try_claim(service) else {
            warn!(service = %service, "Retention already running for service, skipping");
            self.metrics.record_service_skipped();
            result.skipped = true;
            return result;
        };

        let started_at = Utc::now();
        let cutoff = match RetentionCutoff::compute(service, policy.retention_days, now) {
            Ok(cutoff) => cutoff,
            Err(e) => {
                error!(service = %service, error = %e, "Failed to compute retention cutoff");
                result.errors.push(e.to_string());
                self.metrics.record_service_processed();
                return result;
            }
        };
        result.cutoff = Some(cutoff.cutoff_timestamp);

        info!(cutoff = %cutoff.display(), dry_run = self.options.dry_run, "Enforcing retention");

        // Failed records stay in the store, so the next page is taken after
        // the last record returned rather than from the oldest one again.
        let mut cursor: Option<PageCursor> = None;
        let mut seen = HashSet::new();
        loop {
            if result.pages >= self.options.max_pages {
                warn!(
                    service = %service,
                    pages = result.pages,
                    "Reached page limit, remaining records are left for the next run"
                );
                break;
            }

            let page = match self
                .store
                .query_expired(
                    service,
                    cutoff.cutoff_timestamp,
                    cursor.as_ref(),
                    self.options.page_size,
                )
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    let e = RetentionError::from(e);
                    error!(service = %service, error = %e, "Failed to query expired records");
                    result.errors.push(e.to_string());
                    break;
                }
            };
            result.pages += 1;

            let page_len = page.len();
            if let Some(last) = page.last() {
                cursor = Some(last.cursor());
            }
            let fresh: Vec<StoredRecord> = page
                .into_iter()
                .filter(|record| seen.insert(record.id.clone()))
                .collect();

            // A store that ignores the cursor keeps returning the same page
            if fresh.is_empty() {
                break;
            }

            result.selected += fresh.len();
            self.metrics.record_selected(fresh.len());

            for record in fresh {
                self.retire(service, policy, record, &mut result).await;
            }

            if page_len < self.options.page_size {
                break;
            }
        }

        result.duration_ms = u64::try_from((Utc::now() - started_at).num_milliseconds()).unwrap_or(0);
        self.metrics.record_duration_ms(result.duration_ms);
        self.metrics.record_service_processed();

        info!(
            service = %service,
            pages = result.pages,
            selected = result.selected,
            archived = result.archived,
            deleted = result.deleted,
            "Service retention completed"
        );

        result
    }

    /// Archive (if configured) and delete one record.
    async fn retire(
        &self,
        service: &str,
        policy: &RetentionPolicy,
        record: StoredRecord,
        result: &mut ServiceRetentionResult,
    ) {
        if self.options.dry_run {
            info!(
                service = %service,
                id = %record.id,
                archive = policy.archive_bucket().unwrap_or("-"),
                "Dry run: would retire record"
            );
            return;
        }

        if policy.archive_enabled {
            let Some(bucket) = policy.archive_bucket() else {
                warn!(service = %service, id = %record.id, "Archiving enabled without a bucket, keeping record");
                result.archive_failures += 1;
                self.metrics.record_archive_failure();
                return;
            };

            let key = archive_key(&record.id);
            if let Err(e) = self.archive.put(bucket, &key, record.body).await {
                warn!(
                    service = %service,
                    id = %record.id,
                    bucket = %bucket,
                    error = %e,
                    "Failed to archive record, keeping it in the store"
                );
                result.archive_failures += 1;
                self.metrics.record_archive_failure();
                return;
            }

            debug!(service = %service, id = %record.id, bucket = %bucket, key = %key, "Archived record");
            result.archived += 1;
            self.metrics.record_archived();
        }

        match self.store.delete(&record.id).await {
            Ok(()) => {
                debug!(service = %service, id = %record.id, "Deleted record");
                result.deleted += 1;
                self.metrics.record_deleted();
            }
            Err(e) if e.is_not_found() => {
                debug!(service = %service, id = %record.id, "Record already deleted");
                result.deleted += 1;
                self.metrics.record_deleted();
            }
            Err(e) => {
                warn!(
                    service = %service,
                    id = %record.id,
                    error = %e,
                    "Failed to delete record"
                );
                result.delete_failures += 1;
                self.metrics.record_delete_failure();
            }
        }
    }

    /// Reload the policy file and run a pass every `interval` until
    /// `shutdown` completes. A policy file that fails to load aborts that
    /// pass only.
    pub async fn run_periodically<F>(&self, policy_path: &Path, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping retention scheduler");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match RetentionPolicies::load(policy_path) {
                Ok(policies) => {
                    self.run(&policies).await;
                }
                Err(e) => {
                    error!(
                        path = %policy_path.display(),
                        error = %e,
                        "Failed to load retention policies, skipping run"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::TimeZone;
    use common::store::StoreError;
    use common::store::memory::InMemoryLogStore;
    use common::testing::{EntryBuilder, RecordingArchive};
    use common::model::LogEntry;
    use tokio::sync::Semaphore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    // 30 days before now()
    const CUTOFF: &str = "2024-01-31T00:00:00Z";

    async fn seed(store: &InMemoryLogStore, service: &str, timestamp: &str) -> String {
        store
            .write(&EntryBuilder::new(service).timestamp(timestamp).build())
            .await
            .unwrap()
    }

    fn scheduler(
        store: &InMemoryLogStore,
        archive: &RecordingArchive,
        options: SchedulerOptions,
    ) -> RetentionScheduler {
        RetentionScheduler::new(Arc::new(store.clone()), Arc::new(archive.clone()), options)
    }

    fn policies(entries: Vec<(&str, RetentionPolicy)>) -> RetentionPolicies {
        RetentionPolicies::new(entries.into_iter().map(|(s, p)| (s.to_string(), p)))
    }

    #[tokio::test]
    async fn test_delete_without_archive() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        let old = seed(&store, "auth", "2024-01-15T10:00:00Z").await;
        let recent = seed(&store, "auth", "2024-02-20T10:00:00Z").await;

        let result = scheduler(&store, &archive, SchedulerOptions::default())
            .run_at(&policies(vec![("auth", RetentionPolicy::delete_only(30))]), now())
            .await;

        assert_eq!(store.delete_calls(), vec![old.clone()]);
        assert_eq!(archive.put_count(), 0);
        assert!(!store.contains(&old));
        assert!(store.contains(&recent));

        let auth = result.service("auth").unwrap();
        assert_eq!(auth.selected, 1);
        assert_eq!(auth.deleted, 1);
        assert_eq!(auth.archived, 0);
        assert!(auth.is_clean());
    }

    #[tokio::test]
    async fn test_archive_then_delete() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        let id = seed(&store, "payments", "2023-06-01T00:00:00Z").await;

        scheduler(&store, &archive, SchedulerOptions::default())
            .run_at(
                &policies(vec![("payments", RetentionPolicy::archive_to(30, "pay-archive"))]),
                now(),
            )
            .await;

        let objects = archive.objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].bucket, "pay-archive");
        assert_eq!(objects[0].key, format!("logs/{id}.json"));

        let archived: LogEntry = decode_body(&objects[0].body);
        assert_eq!(archived.service, "payments");
        assert!(!store.contains(&id));
    }

    fn decode_body(body: &Bytes) -> LogEntry {
        common::model::RawLogEntry::decode(body)
            .unwrap()
            .into_entry()
            .unwrap()
    }

    #[tokio::test]
    async fn test_archive_failure_prevents_delete() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        let failing = seed(&store, "payments", "2024-01-01T00:00:00Z").await;
        let ok = seed(&store, "payments", "2024-01-02T00:00:00Z").await;
        archive.fail_key(archive_key(&failing));

        let result = scheduler(&store, &archive, SchedulerOptions::default())
            .run_at(
                &policies(vec![("payments", RetentionPolicy::archive_to(30, "b"))]),
                now(),
            )
            .await;

        assert_eq!(store.delete_calls(), vec![ok.clone()]);
        assert!(store.contains(&failing));

        let payments = result.service("payments").unwrap();
        assert_eq!(payments.archive_failures, 1);
        assert_eq!(payments.deleted, 1);
    }

    #[tokio::test]
    async fn test_cutoff_boundary_is_strict() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        let at_cutoff = seed(&store, "auth", CUTOFF).await;
        let just_before = seed(&store, "auth", "2024-01-30T23:59:59Z").await;

        scheduler(&store, &archive, SchedulerOptions::default())
            .run_at(&policies(vec![("auth", RetentionPolicy::delete_only(30))]), now())
            .await;

        assert_eq!(store.delete_calls(), vec![just_before]);
        assert!(store.contains(&at_cutoff));
    }

    #[tokio::test]
    async fn test_services_are_scoped_and_isolated() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        let auth = seed(&store, "auth", "2024-01-01T00:00:00Z").await;
        let billing = seed(&store, "billing", "2024-01-01T00:00:00Z").await;
        let unmanaged = seed(&store, "search", "2020-01-01T00:00:00Z").await;
        store.fail_delete(&auth);

        let result = scheduler(&store, &archive, SchedulerOptions::default())
            .run_at(
                &policies(vec![
                    ("auth", RetentionPolicy::delete_only(30)),
                    ("billing", RetentionPolicy::delete_only(30)),
                ]),
                now(),
            )
            .await;

        assert_eq!(result.service("auth").unwrap().delete_failures, 1);
        assert_eq!(result.service("billing").unwrap().deleted, 1);
        assert!(store.contains(&auth));
        assert!(!store.contains(&billing));
        assert!(store.contains(&unmanaged));
        assert_eq!(result.total_failures(), 1);
    }

    #[tokio::test]
    async fn test_pages_until_exhausted() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        for day in 1..=7 {
            seed(&store, "auth", &format!("2024-01-{day:02}T00:00:00Z")).await;
        }

        let options = SchedulerOptions {
            page_size: 3,
            ..Default::default()
        };
        let result = scheduler(&store, &archive, options)
            .run_at(&policies(vec![("auth", RetentionPolicy::delete_only(30))]), now())
            .await;

        let auth = result.service("auth").unwrap();
        assert_eq!(auth.deleted, 7);
        assert_eq!(auth.pages, 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failing_page_does_not_block_newer_records() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        let mut ids = Vec::new();
        for day in 1..=4 {
            ids.push(seed(&store, "auth", &format!("2024-01-{day:02}T00:00:00Z")).await);
        }
        archive.fail_key(archive_key(&ids[0]));
        archive.fail_key(archive_key(&ids[1]));

        let options = SchedulerOptions {
            page_size: 2,
            ..Default::default()
        };
        let scheduler = scheduler(&store, &archive, options);
        let policies = policies(vec![("auth", RetentionPolicy::archive_to(30, "b"))]);

        let first = scheduler.run_at(&policies, now()).await;
        let auth = first.service("auth").unwrap();
        assert_eq!(auth.pages, 3);
        assert_eq!(auth.selected, 4);
        assert_eq!(auth.archive_failures, 2);
        assert_eq!(auth.deleted, 2);
        assert!(!store.contains(&ids[2]));
        assert!(!store.contains(&ids[3]));

        // Later runs retry the failing records and leave them in place
        for _ in 0..2 {
            let again = scheduler.run_at(&policies, now()).await;
            assert_eq!(again.service("auth").unwrap().archive_failures, 2);
        }
        assert!(store.contains(&ids[0]));
        assert!(store.contains(&ids[1]));
        assert_eq!(store.len(), 2);
        assert_eq!(store.delete_calls(), vec![ids[2].clone(), ids[3].clone()]);
    }

    #[tokio::test]
    async fn test_all_records_failing_still_terminates() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        archive.fail_all(true);
        for day in 1..=4 {
            seed(&store, "auth", &format!("2024-01-{day:02}T00:00:00Z")).await;
        }

        let options = SchedulerOptions {
            page_size: 2,
            ..Default::default()
        };
        let result = scheduler(&store, &archive, options)
            .run_at(&policies(vec![("auth", RetentionPolicy::archive_to(30, "b"))]), now())
            .await;

        let auth = result.service("auth").unwrap();
        // Two full pages, then an empty one past the last record
        assert_eq!(auth.pages, 3);
        assert_eq!(auth.archive_failures, 4);
        assert!(store.delete_calls().is_empty());
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        for day in 1..=6 {
            seed(&store, "auth", &format!("2024-01-{day:02}T00:00:00Z")).await;
        }

        let options = SchedulerOptions {
            page_size: 2,
            max_pages: 2,
            dry_run: false,
        };
        let result = scheduler(&store, &archive, options)
            .run_at(&policies(vec![("auth", RetentionPolicy::delete_only(30))]), now())
            .await;

        assert_eq!(result.service("auth").unwrap().deleted, 4);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        let id = seed(&store, "auth", "2024-01-01T00:00:00Z").await;

        let options = SchedulerOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = scheduler(&store, &archive, options)
            .run_at(&policies(vec![("auth", RetentionPolicy::archive_to(30, "b"))]), now())
            .await;

        assert!(result.dry_run);
        assert_eq!(result.service("auth").unwrap().selected, 1);
        assert_eq!(archive.put_count(), 0);
        assert!(store.delete_calls().is_empty());
        assert!(store.contains(&id));
    }

    struct VanishingStore;

    #[async_trait]
    impl LogStore for VanishingStore {
        async fn write(&self, _entry: &LogEntry) -> Result<String, StoreError> {
            Ok("doc-1".to_string())
        }

        async fn query_expired(
            &self,
            _service: &str,
            _before: DateTime<Utc>,
            _after: Option<&PageCursor>,
            _page_size: usize,
        ) -> Result<Vec<StoredRecord>, StoreError> {
            Ok(vec![StoredRecord {
                id: "doc-1".to_string(),
                timestamp: now() - chrono::Days::new(60),
                body: Bytes::from_static(b"{}"),
            }])
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }
    }

    #[tokio::test]
    async fn test_delete_of_missing_record_counts_as_deleted() {
        let scheduler = RetentionScheduler::new(
            Arc::new(VanishingStore),
            Arc::new(RecordingArchive::new()),
            SchedulerOptions::default(),
        );

        let result = scheduler
            .enforce_service("auth", &RetentionPolicy::delete_only(30), now())
            .await;

        assert_eq!(result.deleted, 1);
        assert_eq!(result.delete_failures, 0);
        assert_eq!(scheduler.metrics().records_deleted(), 1);
    }

    #[tokio::test]
    async fn test_cutoff_overflow_is_reported_per_service() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();

        let result = scheduler(&store, &archive, SchedulerOptions::default())
            .enforce_service("auth", &RetentionPolicy::delete_only(30), DateTime::<Utc>::MIN_UTC)
            .await;

        assert!(result.cutoff.is_none());
        assert_eq!(result.errors.len(), 1);
    }

    /// Store whose search never reflects deletes, like a near-real-time
    /// index between refreshes.
    struct StaleIndexStore {
        records: Vec<StoredRecord>,
        deleted: Mutex<Vec<String>>,
    }

    impl StaleIndexStore {
        fn with_records(count: u64) -> Self {
            let records = (1..=count)
                .map(|n| StoredRecord {
                    id: format!("es-{n:03}"),
                    timestamp: now() - chrono::Days::new(100 - n),
                    body: Bytes::from_static(b"{}"),
                })
                .collect();
            Self {
                records,
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LogStore for StaleIndexStore {
        async fn write(&self, _entry: &LogEntry) -> Result<String, StoreError> {
            Ok("es-new".to_string())
        }

        async fn query_expired(
            &self,
            _service: &str,
            before: DateTime<Utc>,
            after: Option<&PageCursor>,
            page_size: usize,
        ) -> Result<Vec<StoredRecord>, StoreError> {
            Ok(self
                .records
                .iter()
                .filter(|r| r.timestamp < before)
                .filter(|r| after.is_none_or(|c| (r.timestamp, &r.id) > (c.timestamp, &c.id)))
                .take(page_size)
                .cloned()
                .collect())
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.deleted.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pages_past_deleted_records_still_visible_to_search() {
        let store = Arc::new(StaleIndexStore::with_records(5));
        let scheduler = RetentionScheduler::new(
            store.clone(),
            Arc::new(RecordingArchive::new()),
            SchedulerOptions {
                page_size: 2,
                ..Default::default()
            },
        );

        let result = scheduler
            .enforce_service("auth", &RetentionPolicy::delete_only(30), now())
            .await;

        assert_eq!(result.pages, 3);
        assert_eq!(result.deleted, 5);
        assert_eq!(
            *store.deleted.lock().unwrap(),
            vec!["es-001", "es-002", "es-003", "es-004", "es-005"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_pages_through_every_record() {
        let store = InMemoryLogStore::new();
        let archive = RecordingArchive::new();
        for day in 1..=5 {
            seed(&store, "auth", &format!("2024-01-{day:02}T00:00:00Z")).await;
        }

        let options = SchedulerOptions {
            page_size: 2,
            max_pages: 10,
            dry_run: true,
        };
        let result = scheduler(&store, &archive, options)
            .run_at(&policies(vec![("auth", RetentionPolicy::delete_only(30))]), now())
            .await;

        let auth = result.service("auth").unwrap();
        assert_eq!(auth.selected, 5);
        assert_eq!(auth.pages, 3);
        assert_eq!(store.len(), 5);
    }

    struct UnreachableStore;

    #[async_trait]
    impl LogStore for UnreachableStore {
        async fn write(&self, _entry: &LogEntry) -> Result<String, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn query_expired(
            &self,
            _service: &str,
            _before: DateTime<Utc>,
            _after: Option<&PageCursor>,
            _page_size: usize,
        ) -> Result<Vec<StoredRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn delete(&self, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_query_failure_is_reported_as_store_error() {
        let scheduler = RetentionScheduler::new(
            Arc::new(UnreachableStore),
            Arc::new(RecordingArchive::new()),
            SchedulerOptions::default(),
        );

        let result = scheduler
            .enforce_service("auth", &RetentionPolicy::delete_only(30), now())
            .await;

        assert_eq!(result.pages, 0);
        assert_eq!(
            result.errors,
            vec!["store error: store unavailable: connection refused".to_string()]
        );
        assert_eq!(scheduler.metrics().services_processed(), 1);
    }

    /// Store whose queries wait until the test opens the gate.
    struct GatedStore {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl LogStore for GatedStore {
        async fn write(&self, _entry: &LogEntry) -> Result<String, StoreError> {
            Ok("doc-1".to_string())
        }

        async fn query_expired(
            &self,
            _service: &str,
            _before: DateTime<Utc>,
            _after: Option<&PageCursor>,
            _page_size: usize,
        ) -> Result<Vec<StoredRecord>, StoreError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            Ok(vec![])
        }

        async fn delete(&self, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_pass_for_same_service_is_skipped() {
        let gate = Arc::new(Semaphore::new(0));
        let scheduler = Arc::new(RetentionScheduler::new(
            Arc::new(GatedStore {
                gate: Arc::clone(&gate),
            }),
            Arc::new(RecordingArchive::new()),
            SchedulerOptions::default(),
        ));

        let first = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                scheduler
                    .enforce_service("auth", &RetentionPolicy::delete_only(30), now())
                    .await
            })
        };

        while !scheduler.is_in_flight("auth") {
            tokio::task::yield_now().await;
        }

        let second = scheduler
            .enforce_service("auth", &RetentionPolicy::delete_only(30), now())
            .await;
        assert!(second.skipped);

        // Other services are unaffected
        gate.add_permits(2);
        let other = scheduler
            .enforce_service("billing", &RetentionPolicy::delete_only(30), now())
            .await;
        assert!(!other.skipped);

        let first = first.await.unwrap();
        assert!(!first.skipped);
        assert!(!scheduler.is_in_flight("auth"));
        assert_eq!(scheduler.metrics().services_skipped(), 1);
    }
}
