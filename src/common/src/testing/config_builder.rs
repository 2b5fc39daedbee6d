//! Test configuration builder for creating test setups quickly.

use std::path::PathBuf;

use crate::config::{BrokerBackend, Configuration, StoreBackend};
use crate::model::FilterRule;

/// Builder for configurations suitable for tests.
///
/// ```rust,ignore
/// let config = TestConfigBuilder::new()
///     .in_memory()
///     .with_retention_file("/tmp/retention.json")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    /// Broker, store and archive all in memory.
    pub fn in_memory(mut self) -> Self {
        self.config.broker.backend = BrokerBackend::Memory;
        self.config.store.backend = StoreBackend::Memory;
        self.config.archive.url = "memory://".to_string();
        self
    }

    pub fn with_rule(mut self, rule: FilterRule) -> Self {
        self.config.policy.rules.push(rule);
        self
    }

    pub fn without_rules(mut self) -> Self {
        self.config.policy.rules.clear();
        self
    }

    pub fn with_retention_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.retention.config_path = path.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.config.retention.page_size = page_size;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.config.retention.dry_run = true;
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}
