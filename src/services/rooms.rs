//! Room allocation and management.

use std::sync::Arc;

use serde::Deserialize;

use super::webhook::{WebhookEvent, WebhookNotifier};
use super::{new_id, require, ServiceResult};
use crate::backend::types::{unix_now, Room};
use crate::backend::{ObjectStore, StoreError};
use crate::config::RoomConfig;
use crate::observability::metrics;
use crate::routing::Router;

#[derive(Debug, thiserror::Error)]
pub enum RoomConfigError {
    #[error("room.empty_timeout_secs must be non-zero")]
    ZeroEmptyTimeout,
}

/// Options accepted when creating a room. Unset fields use the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateRoomRequest {
    pub name: String,
    pub empty_timeout_secs: Option<u32>,
    pub departure_timeout_secs: Option<u32>,
    pub max_participants: Option<u32>,
    pub metadata: String,
}

/// Turns creation requests into room records placed on this node.
#[derive(Debug, Clone)]
pub struct RoomAllocator {
    defaults: RoomConfig,
    node_id: String,
}

impl RoomAllocator {
    pub fn new(defaults: &RoomConfig, node_id: &str) -> Result<Self, RoomConfigError> {
        if defaults.empty_timeout_secs == 0 {
            return Err(RoomConfigError::ZeroEmptyTimeout);
        }
        Ok(Self {
            defaults: defaults.clone(),
            node_id: node_id.to_string(),
        })
    }

    pub fn auto_create(&self) -> bool {
        self.defaults.auto_create
    }

    pub fn allocate(&self, request: &CreateRoomRequest) -> Room {
        Room {
            sid: new_id("RM_"),
            name: request.name.clone(),
            empty_timeout_secs: request
                .empty_timeout_secs
                .unwrap_or(self.defaults.empty_timeout_secs),
            departure_timeout_secs: request
                .departure_timeout_secs
                .unwrap_or(self.defaults.departure_timeout_secs),
            max_participants: request
                .max_participants
                .unwrap_or(self.defaults.max_participants),
            creation_time: unix_now(),
            node_id: self.node_id.clone(),
            metadata: request.metadata.clone(),
        }
    }
}

/// Owns room records for this node.
pub struct RoomManager {
    store: Arc<dyn ObjectStore>,
    router: Arc<Router>,
    allocator: RoomAllocator,
}

impl RoomManager {
    pub fn new(store: Arc<dyn ObjectStore>, router: Arc<Router>, allocator: RoomAllocator) -> Self {
        Self {
            store,
            router,
            allocator,
        }
    }

    /// Create a room, or return the existing one with the same name.
    ///
    /// The flag reports whether a new room was created.
    pub async fn get_or_create_room(&self, request: &CreateRoomRequest) -> ServiceResult<(Room, bool)> {
        match self.store.load_room(&request.name).await {
            Ok(room) => return Ok((room, false)),
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let room = self.allocator.allocate(request);
        self.store.store_room(&room).await?;
        self.refresh_room_count().await;
        metrics::record_room_event("created");
        tracing::info!(room = %room.name, sid = %room.sid, "Room created");
        Ok((room, true))
    }

    /// Look up a room another feature refers to, creating it when
    /// `room.auto_create` is set.
    pub async fn ensure_room(&self, name: &str) -> ServiceResult<Room> {
        match self.store.load_room(name).await {
            Ok(room) => Ok(room),
            Err(StoreError::NotFound { .. }) if self.allocator.auto_create() => {
                let request = CreateRoomRequest {
                    name: name.to_string(),
                    ..Default::default()
                };
                Ok(self.get_or_create_room(&request).await?.0)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_rooms(&self) -> ServiceResult<Vec<Room>> {
        Ok(self.store.list_rooms().await?)
    }

    pub async fn delete_room(&self, name: &str) -> ServiceResult<Room> {
        let room = self.store.load_room(name).await?;
        self.store.delete_room(name).await?;
        self.refresh_room_count().await;
        metrics::record_room_event("deleted");
        tracing::info!(room = %name, "Room deleted");
        Ok(room)
    }

    async fn refresh_room_count(&self) {
        let node_id = self.router.identity().id.to_string();
        match self.store.list_rooms().await {
            Ok(rooms) => {
                let hosted = rooms.iter().filter(|r| r.node_id == node_id).count();
                self.router.set_room_count(hosted);
            }
            Err(e) => tracing::warn!(error = %e, "Could not refresh room count"),
        }
    }
}

/// Room operations exposed through the API.
pub struct RoomService {
    manager: Arc<RoomManager>,
    webhooks: Arc<WebhookNotifier>,
}

impl RoomService {
    pub fn new(manager: Arc<RoomManager>, webhooks: Arc<WebhookNotifier>) -> Self {
        Self { manager, webhooks }
    }

    pub async fn create_room(&self, request: &CreateRoomRequest) -> ServiceResult<Room> {
        require("name", &request.name)?;
        let (room, created) = self.manager.get_or_create_room(request).await?;
        if created {
            self.webhooks
                .notify(WebhookEvent::new("room_started", Some(room.clone())));
        }
        Ok(room)
    }

    pub async fn list_rooms(&self) -> ServiceResult<Vec<Room>> {
        self.manager.list_rooms().await
    }

    pub async fn delete_room(&self, name: &str) -> ServiceResult<()> {
        require("name", name)?;
        let room = self.manager.delete_room(name).await?;
        self.webhooks
            .notify(WebhookEvent::new("room_finished", Some(room)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialSet;
    use crate::services::ServiceError;
    use crate::backend::Backends;
    use crate::config::{NodeStatsConfig, WebhookConfig};
    use crate::node::NodeIdentity;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn service() -> (RoomService, Arc<Router>) {
        let backends = Backends::standalone();
        let identity =
            NodeIdentity::resolve("127.0.0.1", "", &mut StdRng::seed_from_u64(5)).unwrap();
        let router = Arc::new(
            Router::new(
                identity.clone(),
                backends.store().clone(),
                backends.bus().clone(),
                &NodeStatsConfig::default(),
            )
            .unwrap(),
        );
        let allocator = RoomAllocator::new(&RoomConfig::default(), identity.id.as_str()).unwrap();
        let manager = Arc::new(RoomManager::new(
            backends.store().clone(),
            router.clone(),
            allocator,
        ));
        let credentials =
            CredentialSet::new(BTreeMap::from([("k".to_string(), "s".to_string())])).unwrap();
        let webhooks =
            Arc::new(WebhookNotifier::new(&WebhookConfig::default(), &credentials).unwrap());
        (RoomService::new(manager, webhooks), router)
    }

    #[test]
    fn test_allocator_rejects_zero_empty_timeout() {
        let config = RoomConfig {
            empty_timeout_secs: 0,
            ..Default::default()
        };
        assert!(RoomAllocator::new(&config, "ND_x").is_err());
    }

    #[test]
    fn test_allocator_applies_defaults() {
        let allocator = RoomAllocator::new(&RoomConfig::default(), "ND_abc").unwrap();
        let room = allocator.allocate(&CreateRoomRequest {
            name: "standup".into(),
            max_participants: Some(8),
            ..Default::default()
        });
        assert!(room.sid.starts_with("RM_"));
        assert_eq!(room.empty_timeout_secs, 300);
        assert_eq!(room.max_participants, 8);
        assert_eq!(room.node_id, "ND_abc");
    }

    #[tokio::test]
    async fn test_create_is_idempotent_by_name() {
        let (rooms, router) = service();
        let request = CreateRoomRequest {
            name: "lobby".into(),
            ..Default::default()
        };
        let first = rooms.create_room(&request).await.unwrap();
        let second = rooms.create_room(&request).await.unwrap();
        assert_eq!(first.sid, second.sid);
        assert_eq!(router.local_node().stats.num_rooms, 1);

        rooms.delete_room("lobby").await.unwrap();
        assert!(rooms.list_rooms().await.unwrap().is_empty());
        assert_eq!(router.local_node().stats.num_rooms, 0);
    }

    #[tokio::test]
    async fn test_invalid_and_missing_rooms() {
        let (rooms, _) = service();
        let err = rooms
            .create_room(&CreateRoomRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));

        let err = rooms.delete_room("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Store(StoreError::NotFound { .. })
        ));
    }
}
