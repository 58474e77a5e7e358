//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, intervals, port ranges)
//! - Validate endpoint formats (coordination address, webhook URLs)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::IpAddr;

use crate::config::schema::ServerConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.port == 0 {
        errors.push(ValidationError::new("port", "must be non-zero"));
    }

    for addr in &config.bind_addresses {
        if addr.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                "bind_addresses",
                format!("'{addr}' is not an IP address"),
            ));
        }
    }

    if !config.node_ip.is_empty() && config.node_ip.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "node_ip",
            format!("'{}' is not an IP address", config.node_ip),
        ));
    }

    if config.redis.is_configured() {
        if let Err(reason) = config.redis.connection_url() {
            errors.push(ValidationError::new("redis.address", reason));
        }
        if config.redis.connect_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "redis.connect_timeout_secs",
                "must be at least 1",
            ));
        }
    }

    let rtc = &config.rtc;
    if rtc.udp_port == 0 && rtc.port_range_start > rtc.port_range_end {
        errors.push(ValidationError::new(
            "rtc.port_range_start",
            format!(
                "range {}-{} is inverted",
                rtc.port_range_start, rtc.port_range_end
            ),
        ));
    }

    if config.node_stats.update_interval_secs == 0 {
        errors.push(ValidationError::new(
            "node_stats.update_interval_secs",
            "must be at least 1",
        ));
    }

    for raw in &config.webhook.urls {
        match url::Url::parse(raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => errors.push(ValidationError::new(
                "webhook.urls",
                format!("'{raw}' uses unsupported scheme '{}'", parsed.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                "webhook.urls",
                format!("'{raw}': {e}"),
            )),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
