//! API-facing services built on top of the backends.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → RoomService ─→ RoomManager ─→ RoomAllocator (defaults, limits)
//!     │                    └→ ObjectStore + Router (room count)
//!     │   └→ WebhookNotifier (room_started / room_finished)
//!     → EgressService / IngressService / SipService / AgentDispatchService
//!         → Feature<dyn XStore>: Available → store, Unsupported → error
//! ```
//!
//! # Design Decisions
//! - Services are stateless wrappers; all state lives in the backends
//! - An unsupported feature is an ordinary error the API maps to 501

pub mod agent;
pub mod egress;
pub mod ingress;
pub mod rooms;
pub mod sip;
pub mod webhook;

use thiserror::Error;
use uuid::Uuid;

use crate::backend::StoreError;

pub use agent::AgentDispatchService;
pub use egress::EgressService;
pub use ingress::IngressService;
pub use rooms::{RoomAllocator, RoomManager, RoomService};
pub use sip::SipService;
pub use webhook::{WebhookEvent, WebhookNotifier};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{feature} requires a clustered deployment")]
    Unsupported { feature: &'static str },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// `prefix` followed by 12 random hex characters.
pub(crate) fn new_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &raw[..12])
}

pub(crate) fn require(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}
