//! Agent dispatch: asks agent workers to join a room.

use std::sync::Arc;

use serde::Deserialize;

use super::rooms::RoomManager;
use super::{new_id, require, ServiceError, ServiceResult};
use crate::backend::store::AgentStore;
use crate::backend::types::AgentDispatch;
use crate::backend::Feature;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateDispatchRequest {
    pub agent_name: String,
    pub metadata: String,
}

pub struct AgentDispatchService {
    store: Feature<dyn AgentStore>,
    rooms: Arc<RoomManager>,
}

impl AgentDispatchService {
    pub fn new(store: Feature<dyn AgentStore>, rooms: Arc<RoomManager>) -> Self {
        Self { store, rooms }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    fn store(&self) -> ServiceResult<&Arc<dyn AgentStore>> {
        self.store.get().ok_or(ServiceError::Unsupported {
            feature: "agent dispatch",
        })
    }

    pub async fn create_dispatch(
        &self,
        room_name: &str,
        request: &CreateDispatchRequest,
    ) -> ServiceResult<AgentDispatch> {
        let store = self.store()?;
        require("agent_name", &request.agent_name)?;
        let room = self.rooms.ensure_room(room_name).await?;

        let dispatch = AgentDispatch {
            dispatch_id: new_id("AD_"),
            agent_name: request.agent_name.clone(),
            room_name: room.name,
            metadata: request.metadata.clone(),
        };
        store.store_dispatch(&dispatch).await?;
        tracing::info!(
            dispatch_id = %dispatch.dispatch_id,
            agent = %dispatch.agent_name,
            room = %dispatch.room_name,
            "Agent dispatch created"
        );
        Ok(dispatch)
    }

    pub async fn list_dispatches(&self, room_name: &str) -> ServiceResult<Vec<AgentDispatch>> {
        Ok(self.store()?.list_dispatches(room_name).await?)
    }

    pub async fn delete_dispatch(&self, room_name: &str, dispatch_id: &str) -> ServiceResult<()> {
        Ok(self.store()?.delete_dispatch(room_name, dispatch_id).await?)
    }
}
