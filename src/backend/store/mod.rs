//! Object storage abstraction.
//!
//! `ObjectStore` holds the state every node needs (rooms, participants,
//! node records). Optional feature stores are exposed as capabilities: a
//! store answers `Feature::Available` or `Feature::Unsupported` for each,
//! and the service graph queries them once at build time.

pub mod local;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::types::{
    AgentDispatch, EgressInfo, IngressInfo, NodeInfo, ParticipantInfo, Room, SipTrunk,
};
use super::DeploymentMode;

pub use self::local::LocalStore;
pub use self::redis::RedisStore;

/// Errors returned by storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    #[error("backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("corrupt record: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An optional capability of a storage backend.
pub enum Feature<S: ?Sized> {
    Available(Arc<S>),
    Unsupported,
}

impl<S: ?Sized> Feature<S> {
    pub fn is_available(&self) -> bool {
        matches!(self, Feature::Available(_))
    }

    pub fn get(&self) -> Option<&Arc<S>> {
        match self {
            Feature::Available(store) => Some(store),
            Feature::Unsupported => None,
        }
    }
}

impl<S: ?Sized> Clone for Feature<S> {
    fn clone(&self) -> Self {
        match self {
            Feature::Available(store) => Feature::Available(store.clone()),
            Feature::Unsupported => Feature::Unsupported,
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for Feature<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::Available(_) => f.write_str("Available"),
            Feature::Unsupported => f.write_str("Unsupported"),
        }
    }
}

/// Core state shared by every node of a deployment.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn mode(&self) -> DeploymentMode;

    async fn store_room(&self, room: &Room) -> StoreResult<()>;
    async fn load_room(&self, name: &str) -> StoreResult<Room>;
    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;
    async fn delete_room(&self, name: &str) -> StoreResult<()>;

    async fn store_participant(&self, room: &str, participant: &ParticipantInfo) -> StoreResult<()>;
    async fn list_participants(&self, room: &str) -> StoreResult<Vec<ParticipantInfo>>;
    async fn delete_participant(&self, room: &str, identity: &str) -> StoreResult<()>;

    async fn store_node(&self, node: &NodeInfo) -> StoreResult<()>;
    async fn list_nodes(&self) -> StoreResult<Vec<NodeInfo>>;
    async fn delete_node(&self, id: &str) -> StoreResult<()>;

    fn egress_store(&self) -> Feature<dyn EgressStore>;
    fn ingress_store(&self) -> Feature<dyn IngressStore>;
    fn sip_store(&self) -> Feature<dyn SipStore>;
    fn agent_store(&self) -> Feature<dyn AgentStore>;
}

/// Durable egress job records.
#[async_trait]
pub trait EgressStore: Send + Sync {
    async fn store_egress(&self, info: &EgressInfo) -> StoreResult<()>;
    async fn load_egress(&self, egress_id: &str) -> StoreResult<EgressInfo>;
    async fn list_egress(&self, room: Option<&str>) -> StoreResult<Vec<EgressInfo>>;
}

/// Durable ingress endpoint records.
#[async_trait]
pub trait IngressStore: Send + Sync {
    async fn store_ingress(&self, info: &IngressInfo) -> StoreResult<()>;
    async fn load_ingress(&self, ingress_id: &str) -> StoreResult<IngressInfo>;
    async fn list_ingress(&self) -> StoreResult<Vec<IngressInfo>>;
    async fn delete_ingress(&self, ingress_id: &str) -> StoreResult<()>;
}

/// SIP trunk records shared across nodes.
#[async_trait]
pub trait SipStore: Send + Sync {
    async fn store_trunk(&self, trunk: &SipTrunk) -> StoreResult<()>;
    async fn list_trunks(&self) -> StoreResult<Vec<SipTrunk>>;
    async fn delete_trunk(&self, trunk_id: &str) -> StoreResult<()>;
}

/// Agent dispatch records. Available in both modes.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn store_dispatch(&self, dispatch: &AgentDispatch) -> StoreResult<()>;
    async fn list_dispatches(&self, room: &str) -> StoreResult<Vec<AgentDispatch>>;
    async fn delete_dispatch(&self, room: &str, dispatch_id: &str) -> StoreResult<()>;
}
