//! In-process message bus over broadcast channels.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};

use super::{Message, MessageBus, Subscription, SUBSCRIPTION_BUFFER};
use crate::backend::store::StoreError;
use crate::backend::DeploymentMode;

const TOPIC_CAPACITY: usize = 1024;

/// Message bus visible only inside this process.
#[derive(Clone, Default)]
pub struct LocalMessageBus {
    topics: Arc<DashMap<String, broadcast::Sender<Message>>>,
}

impl LocalMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Message> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl MessageBus for LocalMessageBus {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::Standalone
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        // No subscribers is not an error; the message is simply dropped.
        let _ = self.sender(topic).send(Message {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
        let mut source = self.sender(topic).subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let name = topic.to_string();

        let forwarder = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic = %name, skipped, "Local subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(topic.to_string(), rx, forwarder))
    }
}
