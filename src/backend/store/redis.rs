//! Redis-backed object store shared by every node of a cluster.
//!
//! Each record type lives in a Redis hash keyed by its natural id, with the
//! record JSON-encoded as the hash value.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    AgentStore, EgressStore, Feature, IngressStore, ObjectStore, SipStore, StoreError,
    StoreResult,
};
use crate::backend::types::{
    AgentDispatch, EgressInfo, IngressInfo, NodeInfo, ParticipantInfo, Room, SipTrunk,
};
use crate::backend::DeploymentMode;

const ROOMS_KEY: &str = "rooms";
const NODES_KEY: &str = "nodes";
const EGRESS_KEY: &str = "egress";
const INGRESS_KEY: &str = "ingress";
const SIP_TRUNKS_KEY: &str = "sip_trunks";

fn participants_key(room: &str) -> String {
    format!("room_participants:{room}")
}

fn dispatch_key(room: &str) -> String {
    format!("agent_dispatch:{room}")
}

/// Store backed by a shared Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn put<T: Serialize + Sync>(&self, key: &str, field: &str, value: &T) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(value)?;
        let _: () = conn.hset(key, field, json).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        field: &str,
        kind: &'static str,
    ) -> StoreResult<T> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(key, field).await?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(StoreError::NotFound {
                kind,
                key: field.to_string(),
            }),
        }
    }

    async fn all<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Vec<T>> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(key).await?;
        let mut entries: Vec<(String, String)> = raw.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
            .into_iter()
            .map(|(_, json)| serde_json::from_str(&json).map_err(StoreError::from))
            .collect()
    }

    async fn remove(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.hdel(key, field).await?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl ObjectStore for RedisStore {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::Clustered
    }

    async fn store_room(&self, room: &Room) -> StoreResult<()> {
        self.put(ROOMS_KEY, &room.name, room).await
    }

    async fn load_room(&self, name: &str) -> StoreResult<Room> {
        self.get(ROOMS_KEY, name, "room").await
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        self.all(ROOMS_KEY).await
    }

    async fn delete_room(&self, name: &str) -> StoreResult<()> {
        self.remove(ROOMS_KEY, name).await?;
        let mut conn = self.conn.clone();
        let _: () = conn.del(participants_key(name)).await?;
        Ok(())
    }

    async fn store_participant(&self, room: &str, participant: &ParticipantInfo) -> StoreResult<()> {
        self.put(&participants_key(room), &participant.identity, participant)
            .await
    }

    async fn list_participants(&self, room: &str) -> StoreResult<Vec<ParticipantInfo>> {
        self.all(&participants_key(room)).await
    }

    async fn delete_participant(&self, room: &str, identity: &str) -> StoreResult<()> {
        self.remove(&participants_key(room), identity).await?;
        Ok(())
    }

    async fn store_node(&self, node: &NodeInfo) -> StoreResult<()> {
        self.put(NODES_KEY, &node.id, node).await
    }

    async fn list_nodes(&self) -> StoreResult<Vec<NodeInfo>> {
        self.all(NODES_KEY).await
    }

    async fn delete_node(&self, id: &str) -> StoreResult<()> {
        self.remove(NODES_KEY, id).await?;
        Ok(())
    }

    fn egress_store(&self) -> Feature<dyn EgressStore> {
        Feature::Available(Arc::new(self.clone()))
    }

    fn ingress_store(&self) -> Feature<dyn IngressStore> {
        Feature::Available(Arc::new(self.clone()))
    }

    fn sip_store(&self) -> Feature<dyn SipStore> {
        Feature::Available(Arc::new(self.clone()))
    }

    fn agent_store(&self) -> Feature<dyn AgentStore> {
        Feature::Available(Arc::new(self.clone()))
    }
}

#[async_trait]
impl EgressStore for RedisStore {
    async fn store_egress(&self, info: &EgressInfo) -> StoreResult<()> {
        self.put(EGRESS_KEY, &info.egress_id, info).await
    }

    async fn load_egress(&self, egress_id: &str) -> StoreResult<EgressInfo> {
        self.get(EGRESS_KEY, egress_id, "egress").await
    }

    async fn list_egress(&self, room: Option<&str>) -> StoreResult<Vec<EgressInfo>> {
        let all: Vec<EgressInfo> = self.all(EGRESS_KEY).await?;
        Ok(match room {
            Some(room) => all.into_iter().filter(|e| e.room_name == room).collect(),
            None => all,
        })
    }
}

#[async_trait]
impl IngressStore for RedisStore {
    async fn store_ingress(&self, info: &IngressInfo) -> StoreResult<()> {
        self.put(INGRESS_KEY, &info.ingress_id, info).await
    }

    async fn load_ingress(&self, ingress_id: &str) -> StoreResult<IngressInfo> {
        self.get(INGRESS_KEY, ingress_id, "ingress").await
    }

    async fn list_ingress(&self) -> StoreResult<Vec<IngressInfo>> {
        self.all(INGRESS_KEY).await
    }

    async fn delete_ingress(&self, ingress_id: &str) -> StoreResult<()> {
        if self.remove(INGRESS_KEY, ingress_id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                kind: "ingress",
                key: ingress_id.to_string(),
            })
        }
    }
}

#[async_trait]
impl SipStore for RedisStore {
    async fn store_trunk(&self, trunk: &SipTrunk) -> StoreResult<()> {
        self.put(SIP_TRUNKS_KEY, &trunk.trunk_id, trunk).await
    }

    async fn list_trunks(&self) -> StoreResult<Vec<SipTrunk>> {
        self.all(SIP_TRUNKS_KEY).await
    }

    async fn delete_trunk(&self, trunk_id: &str) -> StoreResult<()> {
        if self.remove(SIP_TRUNKS_KEY, trunk_id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                kind: "sip trunk",
                key: trunk_id.to_string(),
            })
        }
    }
}

#[async_trait]
impl AgentStore for RedisStore {
    async fn store_dispatch(&self, dispatch: &AgentDispatch) -> StoreResult<()> {
        self.put(&dispatch_key(&dispatch.room_name), &dispatch.dispatch_id, dispatch)
            .await
    }

    async fn list_dispatches(&self, room: &str) -> StoreResult<Vec<AgentDispatch>> {
        self.all(&dispatch_key(room)).await
    }

    async fn delete_dispatch(&self, room: &str, dispatch_id: &str) -> StoreResult<()> {
        if self.remove(&dispatch_key(room), dispatch_id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                kind: "dispatch",
                key: dispatch_id.to_string(),
            })
        }
    }
}
