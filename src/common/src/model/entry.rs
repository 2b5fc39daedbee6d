//! Canonical log entry shape as carried on the `logs` topic and stored as a
//! document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::metadata::{self, Metadata, MetadataValue};

/// Metadata key holding the per-entry correlation identifier.
pub const CORRELATION_ID_KEY: &str = "correlation_id";

/// Metadata key holding the resolved geolocation.
pub const GEO_DATA_KEY: &str = "geo_data";

/// Errors raised while decoding a raw broker payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Errors raised when a decoded entry violates the record invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("malformed metadata: {reason}")]
    MalformedMetadata { reason: String },
}

/// A log entry as it arrives on the wire, before validation.
///
/// Absent string fields decode as empty strings so that validation, not
/// decoding, decides whether a record is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLogEntry {
    pub timestamp: String,
    pub level: String,
    pub service: String,
    pub host: String,
    pub message: String,
    pub environment: String,
    pub metadata: Option<Value>,
}

impl RawLogEntry {
    /// Decode a UTF-8 JSON payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject(match value {
                Value::Array(_) => "an array",
                Value::String(_) => "a string",
                Value::Number(_) => "a number",
                Value::Bool(_) => "a boolean",
                _ => "null",
            }));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Check the record invariants without modifying the entry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.service.is_empty() {
            return Err(ValidationError::MissingField { field: "service" });
        }
        if self.environment.is_empty() {
            return Err(ValidationError::MissingField {
                field: "environment",
            });
        }
        if let Some(reason) = metadata::find_unrepresentable(self.metadata.as_ref()) {
            return Err(ValidationError::MalformedMetadata { reason });
        }
        Ok(())
    }

    /// Validate and convert into a [`LogEntry`].
    pub fn into_entry(self) -> Result<LogEntry, ValidationError> {
        self.validate()?;
        Ok(LogEntry {
            timestamp: self.timestamp,
            level: self.level,
            service: self.service,
            host: self.host,
            message: self.message,
            environment: self.environment,
            metadata: metadata::into_metadata(self.metadata),
        })
    }

    /// Service name for counters, falling back to `unknown` when absent.
    pub fn service_label(&self) -> &str {
        if self.service.is_empty() {
            crate::metrics::UNKNOWN_SERVICE
        } else {
            &self.service
        }
    }
}

/// A validated log entry.
///
/// `service` and `environment` are guaranteed non-empty. Entries are only
/// modified by enrichment, which consumes the value before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub service: String,
    pub host: String,
    pub message: String,
    pub environment: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl LogEntry {
    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata
            .get(CORRELATION_ID_KEY)
            .and_then(MetadataValue::as_str)
    }

    /// JSON document body for the store.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
