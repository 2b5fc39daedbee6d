use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use common::metrics::{MetricsRegistry, UNKNOWN_SERVICE};
use common::model::{DecodeError, RawLogEntry, ValidationError};
use common::store::{LogStore, StoreError};

use crate::policy::Policy;

/// Result of handling one broker message.
#[derive(Debug)]
pub enum MessageOutcome {
    Persisted { id: String },
    Filtered { rule: String },
    DecodeFailed(DecodeError),
    Invalid(ValidationError),
    StoreFailed(StoreError),
}

/// Outcome counts for one consumer run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub received: u64,
    pub persisted: u64,
    pub filtered: u64,
    pub decode_failed: u64,
    pub invalid: u64,
    pub store_failed: u64,
}

impl ConsumerSummary {
    pub fn record(&mut self, outcome: &MessageOutcome) {
        self.received += 1;
        match outcome {
            MessageOutcome::Persisted { .. } => self.persisted += 1,
            MessageOutcome::Filtered { .. } => self.filtered += 1,
            MessageOutcome::DecodeFailed(_) => self.decode_failed += 1,
            MessageOutcome::Invalid(_) => self.invalid += 1,
            MessageOutcome::StoreFailed(_) => self.store_failed += 1,
        }
    }
}

/// Applies the policy to every message and writes accepted entries to the
/// store. Delivery is at most once: a failed write is counted and logged,
/// never retried.
pub struct IngestConsumer {
    policy: Arc<Policy>,
    store: Arc<dyn LogStore>,
    metrics: Arc<dyn MetricsRegistry>,
}

impl IngestConsumer {
    pub fn new(
        policy: Arc<Policy>,
        store: Arc<dyn LogStore>,
        metrics: Arc<dyn MetricsRegistry>,
    ) -> Self {
        Self {
            policy,
            store,
            metrics,
        }
    }

    pub async fn handle_message(&self, payload: &[u8]) -> MessageOutcome {
        let raw = match RawLogEntry::decode(payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "Dropping undecodable message");
                self.metrics.record_error(UNKNOWN_SERVICE);
                return MessageOutcome::DecodeFailed(e);
            }
        };

        let service = raw.service_label().to_string();
        let entry = match raw.into_entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(service = %service, error = %e, "Dropping invalid log entry");
                self.metrics.record_error(&service);
                return MessageOutcome::Invalid(e);
            }
        };

        if let Some(rule) = self.policy.matching_rule(&entry) {
            debug!(
                service = %service,
                level = %entry.level,
                environment = %entry.environment,
                rule = %rule.name,
                "Filtered log entry"
            );
            self.metrics.record_dropped(&service);
            return MessageOutcome::Filtered {
                rule: rule.name.clone(),
            };
        }

        self.metrics.record_processed(&service);
        if entry.level == "ERROR" {
            self.metrics.record_error(&service);
        }

        let entry = self.policy.enrich(entry);
        let correlation_id = entry.correlation_id().unwrap_or_default().to_string();

        match self.store.write(&entry).await {
            Ok(id) => {
                debug!(service = %service, correlation_id = %correlation_id, id = %id, "Stored log entry");
                MessageOutcome::Persisted { id }
            }
            Err(e) => {
                error!(
                    service = %service,
                    correlation_id = %correlation_id,
                    error = %e,
                    "Failed to store log entry"
                );
                self.metrics.record_error(&service);
                MessageOutcome::StoreFailed(e)
            }
        }
    }

    /// Consume until the stream ends.
    pub async fn run<S>(&self, stream: S) -> ConsumerSummary
    where
        S: Stream<Item = Bytes>,
    {
        self.run_until(stream, std::future::pending()).await
    }

    /// Consume until the stream ends or `shutdown` completes. A message
    /// already being handled when shutdown fires is finished first.
    pub async fn run_until<S, F>(&self, stream: S, shutdown: F) -> ConsumerSummary
    where
        S: Stream<Item = Bytes>,
        F: Future<Output = ()>,
    {
        tokio::pin!(stream);
        tokio::pin!(shutdown);

        let mut summary = ConsumerSummary::default();
        loop {
            let payload = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping consumer");
                    break;
                }
                next = stream.next() => match next {
                    Some(payload) => payload,
                    None => {
                        info!("Message stream closed, stopping consumer");
                        break;
                    }
                },
            };

            let outcome = self.handle_message(&payload).await;
            summary.record(&outcome);
        }

        info!(
            received = summary.received,
            persisted = summary.persisted,
            filtered = summary.filtered,
            failed = summary.decode_failed + summary.invalid + summary.store_failed,
            "Consumer finished"
        );
        summary
    }
}
