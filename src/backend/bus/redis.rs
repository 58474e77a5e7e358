//! Redis pub/sub message bus shared across the cluster.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;

use super::{Message, MessageBus, Subscription, SUBSCRIPTION_BUFFER};
use crate::backend::store::StoreError;
use crate::backend::DeploymentMode;

/// Open a dedicated pub/sub connection.
async fn open_pubsub(client: &redis::Client) -> Result<redis::aio::PubSub, StoreError> {
    Ok(client.get_async_connection().await?.into_pubsub())
}

/// Message bus backed by Redis PUBLISH/SUBSCRIBE.
///
/// Publishing goes through the shared connection manager; every
/// subscription opens its own pub/sub connection.
#[derive(Clone)]
pub struct RedisMessageBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisMessageBus {
    pub fn new(client: redis::Client, conn: ConnectionManager) -> Self {
        Self { client, conn }
    }
}

#[async_trait]
impl MessageBus for RedisMessageBus {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::Clustered
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn.publish(topic, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
        let mut pubsub = open_pubsub(&self.client).await?;
        pubsub.subscribe(topic).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let name = topic.to_string();
        let forwarder = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(topic = %name, error = %e, "Dropping undecodable bus message");
                        continue;
                    }
                };
                let message = Message {
                    topic: msg.get_channel_name().to_string(),
                    payload,
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            tracing::debug!(topic = %name, "Redis subscription closed");
        });

        Ok(Subscription::new(topic.to_string(), rx, forwarder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pubsub_unreachable_endpoint_errors() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let err = open_pubsub(&client).await.err().unwrap();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
