use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;

pub mod backend;
pub mod config;

pub use backend::{memory::InMemoryBroker, nats::NatsBroker};
pub use config::BackendConfig;

/// Raw message payloads in arrival order. The stream ends when the broker
/// connection is closed.
pub type MessageStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("topic {0} is closed")]
    Closed(String),
}

// Messaging backend trait
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError>;

    // Return a stream of payloads for a specific topic
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, BrokerError>;
}
