//! Signal relay between nodes.
//!
//! Each node listens on its own bus topic (`signal:<node id>`). Messages
//! addressed to a node are published to that topic and fanned out locally
//! to whatever is interested on the receiving side.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::backend::{MessageBus, StoreError};
use crate::config::schema::SignalRelayConfig;
use crate::lifecycle::shutdown::ShutdownListener;
use crate::node::NodeId;
use crate::observability::metrics;

const LOCAL_CAPACITY: usize = 256;

pub fn signal_topic(node_id: &str) -> String {
    format!("signal:{node_id}")
}

/// A signaling message forwarded to the node hosting a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub from_node: String,
    pub room: String,
    pub participant: String,
    pub payload: serde_json::Value,
}

pub struct SignalRelay {
    node_id: NodeId,
    bus: Arc<dyn MessageBus>,
    retry_delay: Duration,
    max_retries: u32,
    local: broadcast::Sender<SignalMessage>,
}

impl SignalRelay {
    pub fn new(node_id: NodeId, bus: Arc<dyn MessageBus>, config: &SignalRelayConfig) -> Self {
        let max_retries = config.max_retries.max(1);
        let retry_delay = Duration::from_millis(config.retry_timeout_ms / u64::from(max_retries));
        let (local, _) = broadcast::channel(LOCAL_CAPACITY);
        Self {
            node_id,
            bus,
            retry_delay,
            max_retries,
            local,
        }
    }

    pub fn topic(&self) -> String {
        signal_topic(self.node_id.as_str())
    }

    /// Messages delivered to this node.
    pub fn subscribe_local(&self) -> broadcast::Receiver<SignalMessage> {
        self.local.subscribe()
    }

    /// Publish a message to another node, retrying on bus errors.
    pub async fn send(
        &self,
        target_node: &str,
        room: &str,
        participant: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        let message = SignalMessage {
            from_node: self.node_id.to_string(),
            room: room.to_string(),
            participant: participant.to_string(),
            payload,
        };
        let bytes = serde_json::to_vec(&message)?;
        let topic = signal_topic(target_node);

        let mut attempt = 1;
        loop {
            match self.bus.publish(&topic, bytes.clone()).await {
                Ok(()) => {
                    metrics::record_signal_relayed("outbound");
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    tracing::debug!(target_node, attempt, error = %e, "Relay publish failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Subscribe to this node's topic and forward messages until shutdown.
    pub async fn start(&self, mut shutdown: ShutdownListener) -> Result<JoinHandle<()>, StoreError> {
        let mut subscription = self.bus.subscribe(&self.topic()).await?;
        let local = self.local.clone();

        Ok(tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = shutdown.requested() => break,
                    msg = subscription.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                match serde_json::from_slice::<SignalMessage>(&msg.payload) {
                    Ok(message) => {
                        metrics::record_signal_relayed("inbound");
                        // No local listeners is fine.
                        let _ = local.send(message);
                    }
                    Err(e) => {
                        tracing::warn!(topic = %msg.topic, error = %e, "Dropping malformed relay message")
                    }
                }
            }
            tracing::debug!(topic = %subscription.topic(), "Signal relay stopped");
        }))
    }
}
