//! Retention cutoff computation.

use chrono::{DateTime, Days, Utc};
use thiserror::Error;

use common::store::StoreError;

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("retention of {retention_days} days before {now} is out of range")]
    CutoffOverflow {
        now: DateTime<Utc>,
        retention_days: u32,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// `now` minus `retention_days` calendar days, in UTC.
pub fn compute_cutoff(now: DateTime<Utc>, retention_days: u32) -> Result<DateTime<Utc>, RetentionError> {
    now.checked_sub_days(Days::new(u64::from(retention_days)))
        .ok_or(RetentionError::CutoffOverflow {
            now,
            retention_days,
        })
}

/// A record is expired when it is strictly older than the cutoff.
pub fn is_expired(timestamp: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
    timestamp < cutoff
}

/// Computed retention cutoff for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionCutoff {
    pub service: String,
    pub retention_days: u32,
    /// Records older than this are eligible for deletion.
    pub cutoff_timestamp: DateTime<Utc>,
}

impl RetentionCutoff {
    pub fn compute(
        service: &str,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, RetentionError> {
        Ok(Self {
            service: service.to_string(),
            retention_days,
            cutoff_timestamp: compute_cutoff(now, retention_days)?,
        })
    }

    pub fn is_expired(&self, timestamp: DateTime<Utc>) -> bool {
        is_expired(timestamp, self.cutoff_timestamp)
    }

    /// Human-readable representation for logging.
    pub fn display(&self) -> String {
        format!(
            "service={}, retention_days={}, cutoff={}",
            self.service,
            self.retention_days,
            self.cutoff_timestamp.to_rfc3339()
        )
    }
}
