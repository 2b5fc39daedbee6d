//! Per-service pipeline counters.
//!
//! The consumer only sees the [`MetricsRegistry`] trait. [`InMemoryMetrics`]
//! backs tests and embedded use; [`PrometheusMetrics`] backs the `/metrics`
//! endpoint of the processor binary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TEXT_FORMAT, TextEncoder};

/// Label used when the owning service of a message is not known.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// The counters tracked per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Entries that passed filtering and were handed to the store.
    Processed,
    /// Decode, validation and store failures plus error-level entries.
    Errors,
    /// Entries removed by a filter rule.
    Dropped,
}

impl Counter {
    pub fn metric_name(&self) -> &'static str {
        match self {
            Counter::Processed => "log_processed_total",
            Counter::Errors => "log_errors_total",
            Counter::Dropped => "log_dropped_total",
        }
    }
}

/// Injectable counter registry. Increments must be safe under concurrent
/// callers without lost updates.
pub trait MetricsRegistry: Send + Sync {
    fn increment(&self, counter: Counter, service: &str);

    /// Current value, zero for a service never seen.
    fn value(&self, counter: Counter, service: &str) -> u64;

    fn record_processed(&self, service: &str) {
        self.increment(Counter::Processed, service);
    }

    fn record_error(&self, service: &str) {
        self.increment(Counter::Errors, service);
    }

    fn record_dropped(&self, service: &str) {
        self.increment(Counter::Dropped, service);
    }
}

/// Lock-light in-memory registry: the map is only write-locked the first
/// time a (counter, service) pair is seen.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetrics {
    inner: Arc<RwLock<HashMap<(Counter, String), Arc<AtomicU64>>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, counter: Counter, service: &str) -> Arc<AtomicU64> {
        let key = (counter, service.to_string());
        if let Some(cell) = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(cell);
        }

        let mut cells = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(key).or_default())
    }

    /// Sum of a counter across all services.
    pub fn total(&self, counter: Counter) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((c, _), _)| *c == counter)
            .map(|(_, cell)| cell.load(Ordering::Relaxed))
            .sum()
    }
}

impl MetricsRegistry for InMemoryMetrics {
    fn increment(&self, counter: Counter, service: &str) {
        self.cell(counter, service).fetch_add(1, Ordering::Relaxed);
    }

    fn value(&self, counter: Counter, service: &str) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(counter, service.to_string()))
            .map(|cell| cell.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Prometheus-backed registry exposing one counter vector per [`Counter`],
/// labelled by `service`.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    processed: IntCounterVec,
    errors: IntCounterVec,
    dropped: IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let processed = Self::register(
            &registry,
            Counter::Processed,
            "Total number of processed logs",
        )?;
        let errors = Self::register(&registry, Counter::Errors, "Total number of log errors")?;
        let dropped = Self::register(
            &registry,
            Counter::Dropped,
            "Total number of logs removed by filter rules",
        )?;

        Ok(Self {
            registry,
            processed,
            errors,
            dropped,
        })
    }

    fn register(
        registry: &Registry,
        counter: Counter,
        help: &str,
    ) -> Result<IntCounterVec, prometheus::Error> {
        let vec = IntCounterVec::new(Opts::new(counter.metric_name(), help), &["service"])?;
        registry.register(Box::new(vec.clone()))?;
        Ok(vec)
    }

    fn vec(&self, counter: Counter) -> &IntCounterVec {
        match counter {
            Counter::Processed => &self.processed,
            Counter::Errors => &self.errors,
            Counter::Dropped => &self.dropped,
        }
    }

    /// Render all counters in the Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl MetricsRegistry for PrometheusMetrics {
    fn increment(&self, counter: Counter, service: &str) {
        self.vec(counter).with_label_values(&[service]).inc();
    }

    fn value(&self, counter: Counter, service: &str) -> u64 {
        self.vec(counter).with_label_values(&[service]).get()
    }
}

/// HTTP router serving `GET /metrics` in the Prometheus text format.
pub fn metrics_router(metrics: PrometheusMetrics) -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .with_state(metrics)
}

async fn serve_metrics(State(metrics): State<PrometheusMetrics>) -> Response {
    match metrics.export() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
