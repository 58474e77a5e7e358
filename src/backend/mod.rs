//! Storage and messaging backend selection.
//!
//! # Data Flow
//! ```text
//! RedisConfig
//!     → select_backends()
//!         not configured → LocalStore + LocalMessageBus   (Standalone)
//!         configured     → connect + PING
//!                        → RedisStore + RedisMessageBus   (Clustered)
//!     → Backends (store, bus, mode)
//!     → consumed once by the service graph builder
//! ```
//!
//! # Design Decisions
//! - The decision is made once per process and never re-evaluated
//! - A failed connection is fatal; there is no fallback to standalone
//! - Store and bus always agree on the mode; `Backends` refuses mixed pairs
//! - Optional feature stores are capabilities declared by each store

pub mod bus;
pub mod store;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::RedisConfig;

pub use bus::{LocalMessageBus, MessageBus, RedisMessageBus, Subscription};
pub use store::{Feature, LocalStore, ObjectStore, RedisStore, StoreError};

/// How this process is deployed, derived from the coordination endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentMode {
    /// Single process, in-memory state.
    Standalone,
    /// Multiple processes sharing a coordination service.
    Clustered,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Standalone => "standalone",
            DeploymentMode::Clustered => "clustered",
        }
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while selecting backends.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The coordination endpoint settings are malformed.
    #[error("invalid coordination endpoint '{address}': {reason}")]
    InvalidEndpoint { address: String, reason: String },

    /// The coordination endpoint could not be reached.
    #[error("failed to connect to coordination endpoint {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: redis::RedisError,
    },

    /// Connecting took longer than the configured timeout.
    #[error("timed out after {secs}s connecting to coordination endpoint {address}")]
    Timeout { address: String, secs: u64 },

    /// A store and a bus of different modes were paired.
    #[error("storage backend is {store} but message bus is {bus}")]
    ModeMismatch {
        store: DeploymentMode,
        bus: DeploymentMode,
    },
}

/// A matched storage and messaging pair.
#[derive(Clone)]
pub struct Backends {
    mode: DeploymentMode,
    store: Arc<dyn ObjectStore>,
    bus: Arc<dyn MessageBus>,
}

impl Backends {
    /// In-process, non-persistent pair for a single node.
    pub fn standalone() -> Self {
        Self {
            mode: DeploymentMode::Standalone,
            store: Arc::new(LocalStore::new()),
            bus: Arc::new(LocalMessageBus::new()),
        }
    }

    /// Shared pair backed by the same coordination client.
    pub fn clustered(client: redis::Client, conn: redis::aio::ConnectionManager) -> Self {
        Self {
            mode: DeploymentMode::Clustered,
            store: Arc::new(RedisStore::new(conn.clone())),
            bus: Arc::new(RedisMessageBus::new(client, conn)),
        }
    }

    /// Pair arbitrary implementations, rejecting a mode mismatch.
    pub fn from_parts(
        store: Arc<dyn ObjectStore>,
        bus: Arc<dyn MessageBus>,
    ) -> Result<Self, BackendError> {
        if store.mode() != bus.mode() {
            return Err(BackendError::ModeMismatch {
                store: store.mode(),
                bus: bus.mode(),
            });
        }
        Ok(Self {
            mode: store.mode(),
            store,
            bus,
        })
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").field("mode", &self.mode).finish()
    }
}

/// Choose and construct the backends for this process.
pub async fn select_backends(config: &RedisConfig) -> Result<Backends, BackendError> {
    if !config.is_configured() {
        tracing::info!(mode = %DeploymentMode::Standalone, "No coordination endpoint configured, using in-process backends");
        return Ok(Backends::standalone());
    }

    let url = config.connection_url().map_err(|reason| BackendError::InvalidEndpoint {
        address: config.address.clone(),
        reason,
    })?;
    let client = redis::Client::open(url.as_str()).map_err(|e| BackendError::InvalidEndpoint {
        address: config.address.clone(),
        reason: e.to_string(),
    })?;

    let timeout = Duration::from_secs(config.connect_timeout_secs);
    let connect = async {
        let mut conn = redis::aio::ConnectionManager::new(client.clone()).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok::<_, redis::RedisError>(conn)
    };

    let conn = match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(source)) => {
            return Err(BackendError::Connect {
                address: config.address.clone(),
                source,
            })
        }
        Err(_) => {
            return Err(BackendError::Timeout {
                address: config.address.clone(),
                secs: config.connect_timeout_secs,
            })
        }
    };

    tracing::info!(
        mode = %DeploymentMode::Clustered,
        address = %config.address,
        db = config.db,
        "Connected to coordination endpoint"
    );
    Ok(Backends::clustered(client, conn))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_endpoint_selects_standalone() {
        let backends = select_backends(&RedisConfig::default()).await.unwrap();
        assert_eq!(backends.mode(), DeploymentMode::Standalone);
        assert_eq!(backends.store().mode(), DeploymentMode::Standalone);
        assert_eq!(backends.bus().mode(), DeploymentMode::Standalone);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fatal() {
        let config = RedisConfig {
            // Port 1 on loopback is never a redis server.
            address: "127.0.0.1:1".into(),
            connect_timeout_secs: 2,
            ..Default::default()
        };
        let err = select_backends(&config).await.unwrap_err();
        assert!(
            matches!(err, BackendError::Connect { .. } | BackendError::Timeout { .. }),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_malformed_endpoint_is_rejected() {
        let config = RedisConfig {
            address: "not a host:port".into(),
            ..Default::default()
        };
        let err = select_backends(&config).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_standalone_pair_agrees() {
        let backends = Backends::standalone();
        assert_eq!(backends.store().mode(), backends.bus().mode());
    }

    struct ClusteredBus;

    #[async_trait::async_trait]
    impl MessageBus for ClusteredBus {
        fn mode(&self) -> DeploymentMode {
            DeploymentMode::Clustered
        }

        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), StoreError> {
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
            Err(StoreError::NotFound {
                kind: "topic",
                key: topic.to_string(),
            })
        }
    }

    #[test]
    fn test_mixed_pair_rejected() {
        let err = Backends::from_parts(Arc::new(LocalStore::new()), Arc::new(ClusteredBus))
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::ModeMismatch {
                store: DeploymentMode::Standalone,
                bus: DeploymentMode::Clustered,
            }
        ));

        let backends =
            Backends::from_parts(Arc::new(LocalStore::new()), Arc::new(LocalMessageBus::new()))
                .unwrap();
        assert_eq!(backends.mode(), DeploymentMode::Standalone);
    }
}
