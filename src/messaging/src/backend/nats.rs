use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::{BrokerError, MessageStream, MessagingBackend};

/// Core NATS backend. Topics map one-to-one onto subjects.
#[derive(Debug, Clone)]
pub struct NatsBroker {
    client: Client,
}

impl NatsBroker {
    pub async fn connect(server_url: &str) -> Result<Self, BrokerError> {
        let client =
            async_nats::connect(server_url)
                .await
                .map_err(|e| BrokerError::Connect {
                    url: server_url.to_string(),
                    reason: e.to_string(),
                })?;
        tracing::info!(url = %server_url, "Connected to NATS");
        Ok(Self { client })
    }
}

#[async_trait]
impl MessagingBackend for NatsBroker {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| BrokerError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream, BrokerError> {
        let subscription =
            self.client
                .subscribe(topic.to_string())
                .await
                .map_err(|e| BrokerError::Subscribe {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;

        Ok(Box::pin(subscription.map(|message| message.payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::timeout;
    use testcontainers_modules::{nats::Nats, testcontainers::runners::AsyncRunner};

    async fn provide_nats() -> Result<
        testcontainers_modules::testcontainers::ContainerAsync<Nats>,
        testcontainers_modules::testcontainers::TestcontainersError,
    > {
        let container = Nats::default().start().await?;
        // Give the container a moment to fully start up
        tokio::time::sleep(tokio::time::Duration::from_millis(2000)).await;
        Ok(container)
    }

    #[tokio::test]
    #[timeout(15000)]
    #[ignore = "requires docker"]
    async fn test_publish_and_subscribe() {
        let nats = provide_nats().await.unwrap();
        let url = format!(
            "nats://{}:{}",
            nats.get_host().await.unwrap(),
            nats.get_host_port_ipv4(4222).await.unwrap()
        );

        let broker = NatsBroker::connect(&url).await.unwrap();
        let mut stream = broker.subscribe("logs").await.unwrap();

        broker
            .publish("logs", Bytes::from_static(br#"{"service":"auth"}"#))
            .await
            .unwrap();

        assert_eq!(
            stream.next().await,
            Some(Bytes::from_static(br#"{"service":"auth"}"#))
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let result = NatsBroker::connect("nats://127.0.0.1:1").await;
        assert!(matches!(result, Err(BrokerError::Connect { .. })));
    }
}
