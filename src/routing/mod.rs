//! Routing subsystem: where nodes are and how to reach them.
//!
//! # Data Flow
//! ```text
//! start:
//!     Router::register_node → ObjectStore (NodeInfo, Serving)
//!     Router::spawn_keepalive → every interval: store + publish "node_stats"
//!     SignalRelay::start → subscribe "signal:<node id>" → local fan-out
//!
//! stop:
//!     Router::drain (ShuttingDown) → keepalive ends → Router::unregister_node
//! ```
//!
//! # Design Decisions
//! - Both parts only depend on the store/bus traits, never on the mode
//! - Nothing here spawns a task before `start`; construction is inert

pub mod relay;
pub mod router;

pub use relay::{SignalMessage, SignalRelay};
pub use router::{Router, RouterError};
