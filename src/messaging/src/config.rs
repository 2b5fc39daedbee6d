use crate::{BrokerError, InMemoryBroker, MessagingBackend, NatsBroker};
use common::config::{BrokerBackend, BrokerConfig};
use std::sync::Arc;

/// Configuration for the messaging system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// In-memory backend configuration.
    Memory {
        /// Per-topic channel capacity.
        capacity: usize,
    },
    /// NATS backend configuration.
    Nats {
        /// The URL of the NATS server.
        server_url: String,
    },
}

impl BackendConfig {
    /// Create a new in-memory backend configuration.
    pub fn memory(capacity: usize) -> Self {
        Self::Memory { capacity }
    }

    /// Create a new NATS backend configuration.
    pub fn nats(server_url: impl Into<String>) -> Self {
        Self::Nats {
            server_url: server_url.into(),
        }
    }

    /// Create a backend from the configuration.
    pub async fn create_backend(&self) -> Result<Arc<dyn MessagingBackend>, BrokerError> {
        match self {
            BackendConfig::Memory { capacity } => Ok(Arc::new(InMemoryBroker::new(*capacity))),
            BackendConfig::Nats { server_url } => {
                let backend = NatsBroker::connect(server_url).await?;
                Ok(Arc::new(backend))
            }
        }
    }
}

impl From<&BrokerConfig> for BackendConfig {
    fn from(config: &BrokerConfig) -> Self {
        match config.backend {
            BrokerBackend::Memory => Self::memory(config.capacity),
            BrokerBackend::Nats => Self::nats(config.url.clone()),
        }
    }
}
