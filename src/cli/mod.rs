//! Command-line interface.
//!
//! Flags map onto [`ConfigOverrides`]; environment variables act as
//! fallbacks for the flags that name one. With no subcommand the server
//! starts.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::auth::{parse_inline_keys, CredentialError};
use crate::config::ConfigOverrides;

#[derive(Debug, Parser)]
#[command(name = "relay-server")]
#[command(version, about = "Real-time media relay server", long_about = None)]
pub struct Cli {
    /// IP address to listen on, repeat for several.
    #[arg(long = "bind", value_name = "IP")]
    pub bind: Vec<String>,

    /// Path to a TOML configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration text, takes priority over --config.
    #[arg(long, env = "RELAY_CONFIG", default_value = "", hide_env_values = true)]
    pub config_body: String,

    /// Path to a TOML file of API keys and secrets.
    #[arg(long, value_name = "FILE")]
    pub key_file: Option<String>,

    /// API keys as "key: secret" lines.
    #[arg(long, env = "RELAY_KEYS", hide_env_values = true)]
    pub keys: Option<String>,

    /// Region of this node.
    #[arg(long, env = "RELAY_REGION")]
    pub region: Option<String>,

    /// IP address advertised to peers.
    #[arg(long, env = "NODE_IP")]
    pub node_ip: Option<String>,

    /// Single UDP port for media.
    #[arg(long, env = "UDP_PORT")]
    pub udp_port: Option<u16>,

    /// Coordination endpoint host:port, enables clustered mode.
    #[arg(long, env = "REDIS_HOST")]
    pub redis_host: Option<String>,

    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Development mode: debug logging, placeholder keys, loopback binds.
    #[arg(long)]
    pub dev: bool,

    /// Accept unknown configuration keys.
    #[arg(long, hide = true)]
    pub disable_strict_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Generate an API key and secret pair
    GenerateKeys,
    /// Print the ports the server will use
    Ports,
    /// List nodes registered with the coordination backend
    ListNodes,
}

impl Cli {
    pub fn strict_config(&self) -> bool {
        !self.disable_strict_config
    }

    /// Collect the flag values that override the configuration text.
    pub fn overrides(&self) -> Result<ConfigOverrides, CredentialError> {
        let keys = match self.keys.as_deref() {
            Some(text) => parse_inline_keys(text)?,
            None => Default::default(),
        };
        Ok(ConfigOverrides {
            bind_addresses: self.bind.clone(),
            key_file: self.key_file.clone(),
            keys,
            region: self.region.clone(),
            node_ip: self.node_ip.clone(),
            udp_port: self.udp_port,
            redis_host: self.redis_host.clone(),
            redis_password: self.redis_password.clone(),
            development: self.dev,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "relay-server",
            "--bind",
            "127.0.0.1",
            "--bind",
            "::1",
            "--dev",
            "--udp-port",
            "7882",
            "--keys",
            "k1: s1\nk2: s2",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert!(cli.strict_config());

        let overrides = cli.overrides().unwrap();
        assert_eq!(overrides.bind_addresses, vec!["127.0.0.1", "::1"]);
        assert_eq!(overrides.udp_port, Some(7882));
        assert_eq!(overrides.keys.len(), 2);
        assert!(overrides.development);
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["relay-server", "generate-keys"]).unwrap();
        assert_eq!(cli.command, Some(Command::GenerateKeys));

        let cli = Cli::try_parse_from(["relay-server", "--disable-strict-config", "list-nodes"])
            .unwrap();
        assert_eq!(cli.command, Some(Command::ListNodes));
        assert!(!cli.strict_config());
    }

    #[test]
    fn test_malformed_inline_keys() {
        let cli = Cli::try_parse_from(["relay-server", "--keys", "no-separator"]).unwrap();
        assert!(cli.overrides().is_err());
    }
}
