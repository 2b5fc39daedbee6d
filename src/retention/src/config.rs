//! Per-service retention policy file.
//!
//! ```json
//! {
//!   "retention_policies": {
//!     "auth": { "retention_days": 30, "archive_to_s3": false },
//!     "payments": { "retention_days": 90, "archive_to_s3": true, "bucket": "payments-archive" }
//!   }
//! }
//! ```
//!
//! The same shape is accepted as TOML when the file ends in `.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Format, Json, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetentionConfigError {
    #[error("failed to read retention configuration {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse retention configuration: {0}")]
    Parse(#[from] Box<figment::Error>),

    #[error("service {service} enables archiving but names no bucket")]
    MissingBucket { service: String },

    #[error("unsupported retention configuration format: {0} (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub retention_days: u32,

    #[serde(rename = "archive_to_s3", alias = "archive_enabled", default)]
    pub archive_enabled: bool,

    /// Archive bucket; only read when archiving is enabled.
    #[serde(
        rename = "bucket",
        alias = "s3_bucket",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub archive_target: Option<String>,
}

impl RetentionPolicy {
    pub fn delete_only(retention_days: u32) -> Self {
        Self {
            retention_days,
            archive_enabled: false,
            archive_target: None,
        }
    }

    pub fn archive_to(retention_days: u32, bucket: impl Into<String>) -> Self {
        Self {
            retention_days,
            archive_enabled: true,
            archive_target: Some(bucket.into()),
        }
    }

    /// Bucket to archive into, `None` when archiving is off.
    pub fn archive_bucket(&self) -> Option<&str> {
        if self.archive_enabled {
            self.archive_target.as_deref()
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicies {
    #[serde(default)]
    pub retention_policies: BTreeMap<String, RetentionPolicy>,
}

impl RetentionPolicies {
    pub fn new(policies: impl IntoIterator<Item = (String, RetentionPolicy)>) -> Self {
        Self {
            retention_policies: policies.into_iter().collect(),
        }
    }

    /// Load and validate a policy file, picking the parser by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RetentionConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| RetentionConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Figment::from(Json::string(&contents)),
            Some("toml") => Figment::from(Toml::string(&contents)),
            _ => return Err(RetentionConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        let policies: Self = figment.extract().map_err(Box::new)?;
        policies.validate()?;
        Ok(policies)
    }

    pub fn validate(&self) -> Result<(), RetentionConfigError> {
        for (service, policy) in &self.retention_policies {
            let has_bucket = policy
                .archive_target
                .as_deref()
                .is_some_and(|bucket| !bucket.trim().is_empty());
            if policy.archive_enabled && !has_bucket {
                return Err(RetentionConfigError::MissingBucket {
                    service: service.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, service: &str) -> Option<&RetentionPolicy> {
        self.retention_policies.get(service)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RetentionPolicy)> {
        self.retention_policies.iter()
    }

    pub fn len(&self) -> usize {
        self.retention_policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retention_policies.is_empty()
    }
}
