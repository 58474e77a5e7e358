//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from TOML.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP API port.
    pub port: u16,

    /// IP addresses to bind the HTTP API on. Empty binds all interfaces.
    pub bind_addresses: Vec<String>,

    /// Development mode: debug logging, placeholder keys, loopback binding.
    pub development: bool,

    /// Inline API key/secret pairs.
    pub keys: BTreeMap<String, String>,

    /// Path to a file holding API key/secret pairs.
    pub key_file: String,

    /// Region label advertised to peers.
    pub region: String,

    /// Advertised IP address. Detected automatically when empty.
    pub node_ip: String,

    /// Coordination endpoint; configuring it selects clustered mode.
    pub redis: RedisConfig,

    pub rtc: RtcConfig,

    pub turn: TurnConfig,

    pub room: RoomConfig,

    pub webhook: WebhookConfig,

    pub node_stats: NodeStatsConfig,

    pub signal_relay: SignalRelayConfig,

    pub ingress: IngressConfig,

    pub logging: LoggingConfig,

    pub prometheus: PrometheusConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7880,
            bind_addresses: Vec::new(),
            development: false,
            keys: BTreeMap::new(),
            key_file: String::new(),
            region: String::new(),
            node_ip: String::new(),
            redis: RedisConfig::default(),
            rtc: RtcConfig::default(),
            turn: TurnConfig::default(),
            room: RoomConfig::default(),
            webhook: WebhookConfig::default(),
            node_stats: NodeStatsConfig::default(),
            signal_relay: SignalRelayConfig::default(),
            ingress: IngressConfig::default(),
            logging: LoggingConfig::default(),
            prometheus: PrometheusConfig::default(),
        }
    }
}

/// Coordination endpoint (Redis) settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// `host:port`, or a full `redis://` URL. Empty means standalone.
    pub address: String,
    pub username: String,
    pub password: String,
    pub db: i64,
    pub use_tls: bool,
    /// Seconds allowed for the initial connection and PING.
    pub connect_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            username: String::new(),
            password: String::new(),
            db: 0,
            use_tls: false,
            connect_timeout_secs: 5,
        }
    }
}

impl RedisConfig {
    pub fn is_configured(&self) -> bool {
        !self.address.trim().is_empty()
    }

    /// Build the connection URL, validating the address.
    ///
    /// A full URL must carry its own credentials, database and scheme.
    pub fn connection_url(&self) -> Result<url::Url, String> {
        let address = self.address.trim();
        if address.contains("://") {
            if !self.username.is_empty()
                || !self.password.is_empty()
                || self.db != 0
                || self.use_tls
            {
                return Err(
                    "a full URL cannot be combined with username, password, db or use_tls"
                        .to_string(),
                );
            }
            return url::Url::parse(address).map_err(|e| e.to_string());
        }

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| "expected host:port".to_string())?;
        if host.is_empty() {
            return Err("missing host".to_string());
        }
        port.parse::<u16>()
            .map_err(|_| format!("invalid port '{port}'"))?;

        let scheme = if self.use_tls { "rediss" } else { "redis" };
        let mut url = url::Url::parse(&format!("{scheme}://{address}/{}", self.db))
            .map_err(|e| e.to_string())?;
        if !self.username.is_empty() {
            url.set_username(&self.username)
                .map_err(|_| "username not allowed".to_string())?;
        }
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| "password not allowed".to_string())?;
        }
        Ok(url)
    }
}

/// Media transport ports (reported by `ports`, not served here).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RtcConfig {
    /// Single UDP port for all media; zero means use the port range.
    pub udp_port: u16,
    pub tcp_port: u16,
    pub port_range_start: u16,
    pub port_range_end: u16,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            udp_port: 0,
            tcp_port: 7881,
            port_range_start: 50000,
            port_range_end: 60000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TurnConfig {
    pub enabled: bool,
    pub tls_port: u16,
    pub udp_port: u16,
}

/// Defaults applied to newly created rooms.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoomConfig {
    pub auto_create: bool,
    pub empty_timeout_secs: u32,
    pub departure_timeout_secs: u32,
    /// Zero means unlimited.
    pub max_participants: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            auto_create: true,
            empty_timeout_secs: 300,
            departure_timeout_secs: 20,
            max_participants: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// API key whose secret identifies outgoing webhooks.
    pub api_key: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeStatsConfig {
    /// Seconds between keepalive/statistics updates.
    pub update_interval_secs: u64,
}

impl Default for NodeStatsConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 2,
        }
    }
}

/// Signal relay retry settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalRelayConfig {
    pub retry_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for SignalRelayConfig {
    fn default() -> Self {
        Self {
            retry_timeout_ms: 7500,
            max_retries: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IngressConfig {
    pub rtmp_base_url: String,
    pub whip_base_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PrometheusConfig {
    /// Metrics exporter port; zero disables the exporter.
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url_from_host_port() {
        let conf = RedisConfig {
            address: "10.0.0.5:6379".into(),
            password: "p@ss".into(),
            db: 2,
            ..Default::default()
        };
        let url = conf.connection_url().unwrap();
        assert_eq!(url.scheme(), "redis");
        assert_eq!(url.port(), Some(6379));
        assert_eq!(url.path(), "/2");
        assert!(url.password().is_some());
    }

    #[test]
    fn test_redis_url_tls_scheme() {
        let conf = RedisConfig {
            address: "cache.internal:6380".into(),
            use_tls: true,
            ..Default::default()
        };
        assert_eq!(conf.connection_url().unwrap().scheme(), "rediss");
    }

    #[test]
    fn test_redis_url_rejects_bad_port() {
        let conf = RedisConfig {
            address: "localhost:redis".into(),
            ..Default::default()
        };
        assert!(conf.connection_url().is_err());
        assert!(conf.is_configured());
    }

    #[test]
    fn test_full_url_rejects_separate_settings() {
        let mut conf = RedisConfig {
            address: "redis://:pw@10.0.0.1:6379/2".into(),
            ..Default::default()
        };
        assert_eq!(conf.connection_url().unwrap().path(), "/2");

        conf.password = "other".into();
        assert!(conf.connection_url().is_err());

        conf.password.clear();
        conf.use_tls = true;
        assert!(conf.connection_url().is_err());
    }
}
