use std::sync::Arc;

use serde::Deserialize;

use super::{new_id, require, ServiceError, ServiceResult};
use crate::backend::store::SipStore;
use crate::backend::types::SipTrunk;
use crate::backend::Feature;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateTrunkRequest {
    pub name: String,
    pub numbers: Vec<String>,
}

/// SIP trunk configuration.
pub struct SipService {
    store: Feature<dyn SipStore>,
}

impl SipService {
    pub fn new(store: Feature<dyn SipStore>) -> Self {
        Self { store }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    fn store(&self) -> ServiceResult<&Arc<dyn SipStore>> {
        self.store
            .get()
            .ok_or(ServiceError::Unsupported { feature: "sip" })
    }

    pub async fn create_trunk(&self, request: &CreateTrunkRequest) -> ServiceResult<SipTrunk> {
        let store = self.store()?;
        require("name", &request.name)?;
        if request.numbers.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "at least one number is required".to_string(),
            ));
        }

        let trunk = SipTrunk {
            trunk_id: new_id("ST_"),
            name: request.name.clone(),
            numbers: request.numbers.clone(),
        };
        store.store_trunk(&trunk).await?;
        Ok(trunk)
    }

    pub async fn list_trunks(&self) -> ServiceResult<Vec<SipTrunk>> {
        Ok(self.store()?.list_trunks().await?)
    }

    pub async fn delete_trunk(&self, trunk_id: &str) -> ServiceResult<()> {
        Ok(self.store()?.delete_trunk(trunk_id).await?)
    }
}
