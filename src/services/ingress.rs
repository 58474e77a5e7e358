//! Ingress (streaming into a room) endpoints.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use super::{new_id, require, ServiceError, ServiceResult};
use crate::backend::store::IngressStore;
use crate::backend::types::IngressInfo;
use crate::backend::Feature;
use crate::config::schema::IngressConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngressInput {
    #[default]
    Rtmp,
    Whip,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateIngressRequest {
    pub input: IngressInput,
    pub room_name: String,
    pub participant_identity: String,
}

pub struct IngressService {
    store: Feature<dyn IngressStore>,
    config: IngressConfig,
}

impl IngressService {
    pub fn new(store: Feature<dyn IngressStore>, config: &IngressConfig) -> Self {
        Self {
            store,
            config: config.clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    fn store(&self) -> ServiceResult<&Arc<dyn IngressStore>> {
        self.store
            .get()
            .ok_or(ServiceError::Unsupported { feature: "ingress" })
    }

    pub async fn create_ingress(&self, request: &CreateIngressRequest) -> ServiceResult<IngressInfo> {
        let store = self.store()?;
        require("room_name", &request.room_name)?;
        require("participant_identity", &request.participant_identity)?;

        let base = match request.input {
            IngressInput::Rtmp => &self.config.rtmp_base_url,
            IngressInput::Whip => &self.config.whip_base_url,
        };
        if base.is_empty() {
            return Err(ServiceError::InvalidRequest(format!(
                "no base url configured for {:?} ingress",
                request.input
            )));
        }

        let info = IngressInfo {
            ingress_id: new_id("IN_"),
            stream_key: Uuid::new_v4().simple().to_string(),
            room_name: request.room_name.clone(),
            participant_identity: request.participant_identity.clone(),
            url: base.clone(),
        };
        store.store_ingress(&info).await?;
        Ok(info)
    }

    pub async fn list_ingress(&self) -> ServiceResult<Vec<IngressInfo>> {
        Ok(self.store()?.list_ingress().await?)
    }

    pub async fn delete_ingress(&self, ingress_id: &str) -> ServiceResult<()> {
        Ok(self.store()?.delete_ingress(ingress_id).await?)
    }
}
