//! Descriptive subcommands.

use std::io::{self, Write};

use rand::Rng;

use crate::auth::credentials::generate_key_pair;
use crate::backend::select_backends;
use crate::config::ServerConfig;
use crate::lifecycle::ServerError;

/// Print a freshly generated API key and secret.
pub fn generate_keys<R: Rng + ?Sized, W: Write>(rng: &mut R, out: &mut W) -> io::Result<()> {
    let (key, secret) = generate_key_pair(rng);
    writeln!(out, "API Key: {key}")?;
    writeln!(out, "API Secret: {secret}")
}

/// Print the ports the configuration will use.
pub fn ports<W: Write>(conf: &ServerConfig, out: &mut W) -> io::Result<()> {
    writeln!(out, "TCP:")?;
    writeln!(out, "  API, WebSocket  {}", conf.port)?;
    writeln!(out, "  ICE/TCP         {}", conf.rtc.tcp_port)?;
    if conf.turn.enabled && conf.turn.tls_port != 0 {
        writeln!(out, "  TURN/TLS        {}", conf.turn.tls_port)?;
    }

    writeln!(out, "UDP:")?;
    if conf.rtc.udp_port != 0 {
        writeln!(out, "  ICE/UDP         {}", conf.rtc.udp_port)?;
    } else {
        writeln!(
            out,
            "  ICE/UDP range   {}-{}",
            conf.rtc.port_range_start, conf.rtc.port_range_end
        )?;
    }
    if conf.turn.enabled && conf.turn.udp_port != 0 {
        writeln!(out, "  TURN/UDP        {}", conf.turn.udp_port)?;
    }
    Ok(())
}

/// Print every node registered with the selected backends.
pub async fn list_nodes<W: Write>(conf: &ServerConfig, out: &mut W) -> Result<(), ServerError> {
    let backends = select_backends(&conf.redis).await?;
    let mut nodes = backends.store().list_nodes().await?;
    nodes.sort_by(|a, b| a.id.cmp(&b.id));

    let write = |out: &mut W| -> io::Result<()> {
        writeln!(
            out,
            "{:<16} {:<40} {:<12} {:<14} {:>6} {:>8}",
            "ID", "IP", "REGION", "STATE", "ROOMS", "CLIENTS"
        )?;
        for node in &nodes {
            writeln!(
                out,
                "{:<16} {:<40} {:<12} {:<14} {:>6} {:>8}",
                node.id,
                node.ip,
                node.region,
                format!("{:?}", node.state),
                node.stats.num_rooms,
                node.stats.num_clients
            )?;
        }
        Ok(())
    };
    write(out).map_err(ServerError::Output)
}
