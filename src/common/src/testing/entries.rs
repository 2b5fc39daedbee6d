use crate::model::{LogEntry, MetadataValue};

/// Builder for log entries with sensible defaults.
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    entry: LogEntry,
}

impl EntryBuilder {
    pub fn new(service: &str) -> Self {
        Self {
            entry: LogEntry {
                timestamp: "2024-01-01T00:00:00Z".to_string(),
                level: "INFO".to_string(),
                service: service.to_string(),
                host: "web-1".to_string(),
                message: "request handled".to_string(),
                environment: "production".to_string(),
                metadata: Default::default(),
            },
        }
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.entry.timestamp = timestamp.into();
        self
    }

    pub fn level(mut self, level: &str) -> Self {
        self.entry.level = level.to_string();
        self
    }

    pub fn environment(mut self, environment: &str) -> Self {
        self.entry.environment = environment.to_string();
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.entry.host = host.to_string();
        self
    }

    pub fn message(mut self, message: &str) -> Self {
        self.entry.message = message.to_string();
        self
    }

    pub fn metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.entry.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> LogEntry {
        self.entry
    }

    /// The entry as the JSON payload a producer would publish.
    pub fn payload(self) -> Vec<u8> {
        serde_json::to_vec(&self.entry).unwrap_or_default()
    }
}
