//! Node registry and keepalive.
//!
//! # Responsibilities
//! - Keep this node's record (state + load statistics)
//! - Register, drain, and unregister the node in the object store
//! - Publish statistics on the bus at a fixed interval
//!
//! # Design Decisions
//! - The local record lives in an `ArcSwap`; readers never block the ticker
//! - Keepalive stops as soon as any shutdown is requested, so a drained
//!   record is never overwritten with `Serving`

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;

use crate::backend::types::{unix_now, NodeInfo, NodeState, NodeStats};
use crate::backend::{MessageBus, ObjectStore, StoreError};
use crate::config::NodeStatsConfig;
use crate::lifecycle::shutdown::ShutdownListener;
use crate::node::NodeIdentity;
use crate::observability::metrics;

/// Bus topic carrying node statistics.
pub const NODE_STATS_TOPIC: &str = "node_stats";

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("node stats update interval must be at least one second")]
    InvalidInterval,
}

pub struct Router {
    identity: NodeIdentity,
    store: Arc<dyn ObjectStore>,
    bus: Arc<dyn MessageBus>,
    interval: Duration,
    local: ArcSwap<NodeInfo>,
}

impl Router {
    pub fn new(
        identity: NodeIdentity,
        store: Arc<dyn ObjectStore>,
        bus: Arc<dyn MessageBus>,
        config: &NodeStatsConfig,
    ) -> Result<Self, RouterError> {
        if config.update_interval_secs == 0 {
            return Err(RouterError::InvalidInterval);
        }

        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        let local = NodeInfo {
            id: identity.id.to_string(),
            ip: identity.ip.to_string(),
            region: identity.region.clone(),
            state: NodeState::Starting,
            stats: NodeStats {
                num_cpus,
                ..Default::default()
            },
        };

        Ok(Self {
            identity,
            store,
            bus,
            interval: Duration::from_secs(config.update_interval_secs),
            local: ArcSwap::from_pointee(local),
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn update_interval(&self) -> Duration {
        self.interval
    }

    /// Snapshot of this node's record.
    pub fn local_node(&self) -> NodeInfo {
        NodeInfo::clone(&self.local.load())
    }

    fn update_local(&self, f: impl Fn(&mut NodeInfo)) -> NodeInfo {
        let mut next = self.local_node();
        self.local.rcu(|current| {
            next = NodeInfo::clone(current);
            f(&mut next);
            next.clone()
        });
        next
    }

    /// Record the number of rooms hosted here.
    pub fn set_room_count(&self, rooms: usize) {
        self.update_local(|node| node.stats.num_rooms = rooms as u32);
        metrics::record_rooms(rooms);
    }

    pub async fn register_node(&self) -> Result<(), StoreError> {
        let now = unix_now();
        let node = self.update_local(|node| {
            node.state = NodeState::Serving;
            node.stats.started_at = now;
            node.stats.updated_at = now;
        });
        self.store.store_node(&node).await?;
        tracing::info!(node_id = %node.id, ip = %node.ip, region = %node.region, "Node registered");
        Ok(())
    }

    /// Advertise that this node accepts no new work.
    pub async fn drain(&self) -> Result<(), StoreError> {
        let node = self.update_local(|node| node.state = NodeState::ShuttingDown);
        self.store.store_node(&node).await?;
        tracing::info!(node_id = %node.id, "Node marked as shutting down");
        Ok(())
    }

    pub async fn unregister_node(&self) -> Result<(), StoreError> {
        self.store.delete_node(self.identity.id.as_str()).await?;
        tracing::info!(node_id = %self.identity.id, "Node unregistered");
        Ok(())
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeInfo>, StoreError> {
        self.store.list_nodes().await
    }

    /// Refresh the record in the store and publish it on the bus.
    pub async fn publish_stats(&self) -> Result<(), StoreError> {
        let now = unix_now();
        let node = self.update_local(|node| node.stats.updated_at = now);
        self.store.store_node(&node).await?;
        let payload = serde_json::to_vec(&node)?;
        self.bus.publish(NODE_STATS_TOPIC, payload).await
    }

    /// Run the keepalive loop until shutdown is requested.
    pub fn spawn_keepalive(self: &Arc<Self>, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(router.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; registration already stored the record.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.requested() => break,
                    _ = ticker.tick() => {
                        let result = router.publish_stats().await;
                        metrics::record_keepalive(result.is_ok());
                        if let Err(e) = result {
                            tracing::warn!(error = %e, "Failed to publish node stats");
                        }
                    }
                }
            }
            tracing::debug!("Keepalive stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backends;
    use crate::lifecycle::shutdown::Shutdown;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn router(interval: u64) -> (Arc<Router>, Backends) {
        let backends = Backends::standalone();
        let identity =
            NodeIdentity::resolve("127.0.0.1", "local", &mut StdRng::seed_from_u64(3)).unwrap();
        let router = Router::new(
            identity,
            backends.store().clone(),
            backends.bus().clone(),
            &NodeStatsConfig {
                update_interval_secs: interval,
            },
        )
        .unwrap();
        (Arc::new(router), backends)
    }

    #[test]
    fn test_zero_interval_rejected() {
        let backends = Backends::standalone();
        let identity =
            NodeIdentity::resolve("127.0.0.1", "", &mut StdRng::seed_from_u64(3)).unwrap();
        let result = Router::new(
            identity,
            backends.store().clone(),
            backends.bus().clone(),
            &NodeStatsConfig {
                update_interval_secs: 0,
            },
        );
        assert!(matches!(result, Err(RouterError::InvalidInterval)));
    }

    #[tokio::test]
    async fn test_register_drain_unregister() {
        let (router, backends) = router(2);
        assert_eq!(router.local_node().state, NodeState::Starting);

        router.register_node().await.unwrap();
        let nodes = backends.store().list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].state, NodeState::Serving);

        router.drain().await.unwrap();
        let nodes = router.list_nodes().await.unwrap();
        assert_eq!(nodes[0].state, NodeState::ShuttingDown);

        router.unregister_node().await.unwrap();
        assert!(router.list_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keepalive_publishes_until_shutdown() {
        let (router, backends) = router(1);
        router.register_node().await.unwrap();
        router.set_room_count(4);
        let mut stats = backends.bus().subscribe(NODE_STATS_TOPIC).await.unwrap();

        let shutdown = Shutdown::new();
        let handle = router.spawn_keepalive(shutdown.subscribe());

        let msg = stats.recv().await.unwrap();
        let node: NodeInfo = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(node.stats.num_rooms, 4);

        shutdown.trigger(false);
        handle.await.unwrap();
    }
}
