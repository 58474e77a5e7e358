//! In-process object store.
//!
//! State lives only in this process and is lost on restart. Durable
//! feature stores (egress, ingress, SIP) are not offered.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    AgentStore, EgressStore, Feature, IngressStore, ObjectStore, SipStore, StoreError,
    StoreResult,
};
use crate::backend::types::{AgentDispatch, NodeInfo, ParticipantInfo, Room};
use crate::backend::DeploymentMode;

#[derive(Default)]
struct Inner {
    rooms: DashMap<String, Room>,
    /// (room, identity) -> participant
    participants: DashMap<(String, String), ParticipantInfo>,
    nodes: DashMap<String, NodeInfo>,
    /// (room, dispatch id) -> dispatch
    dispatches: DashMap<(String, String), AgentDispatch>,
}

/// A thread-safe store backed by concurrent maps.
#[derive(Clone, Default)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::Standalone
    }

    async fn store_room(&self, room: &Room) -> StoreResult<()> {
        self.inner.rooms.insert(room.name.clone(), room.clone());
        Ok(())
    }

    async fn load_room(&self, name: &str) -> StoreResult<Room> {
        self.inner
            .rooms
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: "room",
                key: name.to_string(),
            })
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let mut rooms: Vec<Room> = self.inner.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rooms)
    }

    async fn delete_room(&self, name: &str) -> StoreResult<()> {
        self.inner.rooms.remove(name);
        self.inner.participants.retain(|(room, _), _| room != name);
        Ok(())
    }

    async fn store_participant(&self, room: &str, participant: &ParticipantInfo) -> StoreResult<()> {
        self.inner.participants.insert(
            (room.to_string(), participant.identity.clone()),
            participant.clone(),
        );
        Ok(())
    }

    async fn list_participants(&self, room: &str) -> StoreResult<Vec<ParticipantInfo>> {
        let mut participants: Vec<ParticipantInfo> = self
            .inner
            .participants
            .iter()
            .filter(|r| r.key().0 == room)
            .map(|r| r.value().clone())
            .collect();
        participants.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(participants)
    }

    async fn delete_participant(&self, room: &str, identity: &str) -> StoreResult<()> {
        self.inner
            .participants
            .remove(&(room.to_string(), identity.to_string()));
        Ok(())
    }

    async fn store_node(&self, node: &NodeInfo) -> StoreResult<()> {
        self.inner.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn list_nodes(&self) -> StoreResult<Vec<NodeInfo>> {
        Ok(self.inner.nodes.iter().map(|r| r.value().clone()).collect())
    }

    async fn delete_node(&self, id: &str) -> StoreResult<()> {
        self.inner.nodes.remove(id);
        Ok(())
    }

    fn egress_store(&self) -> Feature<dyn EgressStore> {
        Feature::Unsupported
    }

    fn ingress_store(&self) -> Feature<dyn IngressStore> {
        Feature::Unsupported
    }

    fn sip_store(&self) -> Feature<dyn SipStore> {
        Feature::Unsupported
    }

    fn agent_store(&self) -> Feature<dyn AgentStore> {
        Feature::Available(Arc::new(self.clone()))
    }
}

#[async_trait]
impl AgentStore for LocalStore {
    async fn store_dispatch(&self, dispatch: &AgentDispatch) -> StoreResult<()> {
        self.inner.dispatches.insert(
            (dispatch.room_name.clone(), dispatch.dispatch_id.clone()),
            dispatch.clone(),
        );
        Ok(())
    }

    async fn list_dispatches(&self, room: &str) -> StoreResult<Vec<AgentDispatch>> {
        Ok(self
            .inner
            .dispatches
            .iter()
            .filter(|r| r.key().0 == room)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn delete_dispatch(&self, room: &str, dispatch_id: &str) -> StoreResult<()> {
        self.inner
            .dispatches
            .remove(&(room.to_string(), dispatch_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: "dispatch",
                key: dispatch_id.to_string(),
            })
    }
}
