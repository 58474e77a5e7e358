//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! --config-body / RELAY_CONFIG ─┐
//! --config <file> ──────────────┴→ loader::resolve_config_string (body wins)
//!     → loader::parse_config (TOML, strict unknown-key check)
//!     → loader::apply_overrides (flags and env)
//!     → loader::apply_development_defaults (--dev)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_config_string, ConfigError, ConfigOverrides};
pub use schema::{
    LoggingConfig, NodeStatsConfig, RedisConfig, RoomConfig, ServerConfig, WebhookConfig,
};
pub use validation::ValidationError;
