use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;

use crate::{BrokerError, MessageStream, MessagingBackend};

struct Topic {
    sender: Option<mpsc::Sender<Bytes>>,
    receiver: Option<mpsc::Receiver<Bytes>>,
}

/// Broker keeping one bounded channel per topic. Messages published
/// before anyone subscribes are buffered up to the channel capacity; the
/// first subscriber takes the channel.
#[derive(Clone)]
pub struct InMemoryBroker {
    topics: Arc<Mutex<HashMap<String, Topic>>>,
    buffer_size: usize,
}

impl InMemoryBroker {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            buffer_size: buffer_size.max(1),
        }
    }

    fn open_topic(&self) -> Topic {
        let (sender, receiver) = mpsc::channel(self.buffer_size);
        Topic {
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }

    /// Close a topic. Its stream yields the buffered messages and then
    /// ends; later publishes fail with [`BrokerError::Closed`].
    pub async fn close(&self, topic: &str) {
        let mut topics = self.topics.lock().await;
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(|| self.open_topic());
        entry.sender = None;
    }
}

#[async_trait]
impl MessagingBackend for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        let sender = {
            let mut topics = self.topics.lock().await;
            let entry = topics
                .entry(topic.to_string())
                .or_insert_with(|| self.open_topic());
            entry
                .sender
                .clone()
                .ok_or_else(|| BrokerError::Closed(topic.to_string()))?
        };

        // Send outside the lock so a full channel cannot block other topics
        sender.send(payload).await.map_err(|e| BrokerError::Publish {
            topic: topic.to_string(),
            reason: e.to_string(),
        })
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream, BrokerError> {
        let mut topics = self.topics.lock().await;
        let entry = topics
            .entry(topic.to_string())
            .or_insert_with(|| self.open_topic());

        let receiver = entry
            .receiver
            .take()
            .ok_or_else(|| BrokerError::Subscribe {
                topic: topic.to_string(),
                reason: "topic already has a subscriber".to_string(),
            })?;

        Ok(Box::pin(ReceiverStream::new(receiver)))
    }
}
