//! HTTP API subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (one listener per bind address)
//!     → server.rs (axum::serve with graceful shutdown)
//!     → TraceLayer → TimeoutLayer
//!     → api.rs routes
//!         "/" and "/healthz"         → handlers.rs (no auth)
//!         everything else            → auth::api_auth_middleware → handlers.rs
//!     → services (rooms, egress, ingress, sip, agents)
//!     → response.rs (ServiceError → status + JSON body)
//! ```

pub mod api;
pub mod handlers;
pub mod response;
pub mod server;

pub use api::{build_router, ApiState};
pub use server::{listen_addrs, HttpError, HttpServer};
