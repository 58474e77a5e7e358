//! Publish/subscribe message bus.
//!
//! Topics are plain strings; payloads are opaque bytes. A subscription
//! yields every message published to its topic after it was created.

pub mod local;
pub mod redis;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::store::StoreError;
use super::DeploymentMode;

pub use self::local::LocalMessageBus;
pub use self::redis::RedisMessageBus;

/// Messages buffered per subscription before the forwarder waits.
const SUBSCRIPTION_BUFFER: usize = 256;

/// A message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A live subscription to one topic.
///
/// Dropping the subscription stops its forwarding task.
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<Message>,
    forwarder: JoinHandle<()>,
}

impl Subscription {
    fn new(topic: String, rx: mpsc::Receiver<Message>, forwarder: JoinHandle<()>) -> Self {
        Self { topic, rx, forwarder }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message. Returns `None` once the bus side closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    fn mode(&self) -> DeploymentMode;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), StoreError>;

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError>;
}
