//! Configuration loading: text resolution, TOML parsing, overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown config keys: {}", .0.join(", "))]
    UnknownKeys(Vec<String>),

    #[error("invalid config: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values supplied on the command line or through the environment.
///
/// Every populated field replaces the corresponding value from the config
/// text.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_addresses: Vec<String>,
    pub key_file: Option<String>,
    pub keys: BTreeMap<String, String>,
    pub region: Option<String>,
    pub node_ip: Option<String>,
    pub udp_port: Option<u16>,
    pub redis_host: Option<String>,
    pub redis_password: Option<String>,
    pub development: bool,
}

/// Pick the configuration text to use.
///
/// A non-empty inline body always wins. With no body and no file the
/// result is empty, meaning "all defaults". Otherwise the file is read and
/// a read failure is returned to the caller.
pub fn resolve_config_string(file: Option<&Path>, body: &str) -> Result<String, ConfigError> {
    let file = match file {
        Some(path) if !body.is_empty() || path.as_os_str().is_empty() => {
            return Ok(body.to_string())
        }
        None => return Ok(body.to_string()),
        Some(path) => path,
    };

    fs::read_to_string(file).map_err(|source| ConfigError::Read {
        path: file.to_path_buf(),
        source,
    })
}

/// Parse TOML text into a [`ServerConfig`].
///
/// In strict mode any key that does not map onto the schema is rejected.
pub fn parse_config(text: &str, strict: bool) -> Result<ServerConfig, ConfigError> {
    if text.trim().is_empty() {
        return Ok(ServerConfig::default());
    }

    let raw: toml::Table = toml::from_str(text)?;
    let config: ServerConfig = raw.clone().try_into()?;

    if strict {
        // Anything dropped by a serialize round-trip was not consumed by serde.
        let known = toml::Table::try_from(&config).unwrap_or_default();
        let mut unknown = Vec::new();
        collect_unknown_keys(&raw, &known, "", &mut unknown);
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownKeys(unknown));
        }
    }

    Ok(config)
}

fn collect_unknown_keys(
    input: &toml::Table,
    known: &toml::Table,
    prefix: &str,
    out: &mut Vec<String>,
) {
    for (key, value) in input {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match (value, known.get(key)) {
            (_, None) => out.push(path),
            (toml::Value::Table(inner), Some(toml::Value::Table(schema))) => {
                collect_unknown_keys(inner, schema, &path, out)
            }
            _ => {}
        }
    }
}

/// Apply command-line and environment overrides on top of parsed config.
pub fn apply_overrides(config: &mut ServerConfig, overrides: &ConfigOverrides) {
    if !overrides.bind_addresses.is_empty() {
        config.bind_addresses = overrides.bind_addresses.clone();
    }
    if let Some(key_file) = &overrides.key_file {
        config.key_file = key_file.clone();
    }
    if !overrides.keys.is_empty() {
        config.keys = overrides.keys.clone();
    }
    if let Some(region) = &overrides.region {
        config.region = region.clone();
    }
    if let Some(node_ip) = &overrides.node_ip {
        config.node_ip = node_ip.clone();
    }
    if let Some(port) = overrides.udp_port {
        config.rtc.udp_port = port;
    }
    if let Some(host) = &overrides.redis_host {
        config.redis.address = host.clone();
    }
    if let Some(password) = &overrides.redis_password {
        config.redis.password = password.clone();
    }
    if overrides.development {
        config.development = true;
    }
}

/// Relax the configuration for local development.
pub fn apply_development_defaults(config: &mut ServerConfig) {
    if !config.development {
        return;
    }
    config.logging.level = "debug".to_string();
    if config.keys.is_empty() && config.key_file.is_empty() {
        config
            .keys
            .insert("devkey".to_string(), "secret".to_string());
    }
    if config.bind_addresses.is_empty() {
        config.bind_addresses = vec!["127.0.0.1".to_string(), "::1".to_string()];
    }
}

/// Resolve, parse, override, and validate the server configuration.
pub fn load_config(
    file: Option<&Path>,
    body: &str,
    strict: bool,
    overrides: &ConfigOverrides,
) -> Result<ServerConfig, ConfigError> {
    let text = resolve_config_string(file, body)?;
    let mut config = parse_config(&text, strict)?;

    apply_overrides(&mut config, overrides);
    apply_development_defaults(&mut config);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
