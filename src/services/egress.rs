//! Egress (recording and streaming out) job tracking.

use std::sync::Arc;

use super::rooms::RoomManager;
use super::{new_id, require, ServiceError, ServiceResult};
use crate::backend::store::EgressStore;
use crate::backend::types::{unix_now, EgressInfo, EgressStatus};
use crate::backend::Feature;

pub struct EgressService {
    store: Feature<dyn EgressStore>,
    rooms: Arc<RoomManager>,
}

impl EgressService {
    pub fn new(store: Feature<dyn EgressStore>, rooms: Arc<RoomManager>) -> Self {
        Self { store, rooms }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    fn store(&self) -> ServiceResult<&Arc<dyn EgressStore>> {
        self.store
            .get()
            .ok_or(ServiceError::Unsupported { feature: "egress" })
    }

    pub async fn start_room_egress(&self, room_name: &str) -> ServiceResult<EgressInfo> {
        let store = self.store()?;
        require("room_name", room_name)?;
        let room = self.rooms.ensure_room(room_name).await?;

        let info = EgressInfo {
            egress_id: new_id("EG_"),
            room_name: room.name,
            status: EgressStatus::Starting,
            started_at: unix_now(),
            error: String::new(),
        };
        store.store_egress(&info).await?;
        tracing::info!(egress_id = %info.egress_id, room = %info.room_name, "Egress requested");
        Ok(info)
    }

    pub async fn stop_egress(&self, egress_id: &str) -> ServiceResult<EgressInfo> {
        let store = self.store()?;
        let mut info = store.load_egress(egress_id).await?;
        match info.status {
            EgressStatus::Starting | EgressStatus::Active => {
                info.status = EgressStatus::Ending;
                store.store_egress(&info).await?;
                Ok(info)
            }
            status => Err(ServiceError::InvalidRequest(format!(
                "egress {egress_id} is {status:?}"
            ))),
        }
    }

    pub async fn list_egress(&self, room_name: Option<&str>) -> ServiceResult<Vec<EgressInfo>> {
        Ok(self.store()?.list_egress(room_name).await?)
    }
}
