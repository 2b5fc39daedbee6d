//! Time-based retention for stored log entries.
//!
//! - `config`: per-service retention policies loaded from JSON or TOML
//! - `policy`: cutoff computation in UTC
//! - `scheduler`: the paged archive-then-delete pass
//! - `metrics`: counters for retention runs
//!
//! ```no_run
//! use retention::{RetentionPolicies, RetentionScheduler, SchedulerOptions};
//! # async fn demo(
//! #     store: std::sync::Arc<dyn common::store::LogStore>,
//! #     archive: std::sync::Arc<dyn common::archive::ArchiveTarget>,
//! # ) -> Result<(), retention::RetentionConfigError> {
//! let policies = RetentionPolicies::load("retention.json")?;
//! let scheduler = RetentionScheduler::new(store, archive, SchedulerOptions::default());
//! let result = scheduler.run(&policies).await;
//! println!("deleted {} records", result.total_deleted());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod metrics;
pub mod policy;
pub mod scheduler;

pub use config::{RetentionConfigError, RetentionPolicies, RetentionPolicy};
pub use metrics::RetentionMetrics;
pub use policy::{RetentionCutoff, RetentionError, compute_cutoff, is_expired};
pub use scheduler::{
    RetentionRunResult, RetentionScheduler, SchedulerOptions, ServiceRetentionResult,
};
