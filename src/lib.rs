//! Real-time media relay server: process core.
//!
//! Loads credentials, picks standalone or clustered backends, builds the
//! service graph, and runs it under a two-phase signal-driven lifecycle.

// Process entry
pub mod cli;
pub mod config;
pub mod lifecycle;

// Core subsystems
pub mod auth;
pub mod backend;
pub mod graph;
pub mod node;

// Served functionality
pub mod http;
pub mod routing;
pub mod services;

// Cross-cutting concerns
pub mod observability;

pub use config::ServerConfig;
pub use graph::ServiceGraph;
pub use lifecycle::{LifecycleManager, Shutdown};
