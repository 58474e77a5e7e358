//! Node identity: who this process is within a deployment.
//!
//! The identity is created once during startup and never changes. Its id is
//! random, drawn from an RNG the caller owns, so tests can seed it.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use rand::Rng;
use serde::{Deserialize, Serialize};

const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

pub const NODE_ID_PREFIX: &str = "ND_";
const NODE_ID_LEN: usize = 12;

/// Draw `len` characters from the base62 alphabet.
pub fn random_base62<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| BASE62[rng.gen_range(0..BASE62.len())] as char)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(format!("{NODE_ID_PREFIX}{}", random_base62(rng, NODE_ID_LEN)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid node ip '{value}'")]
pub struct NodeIpError {
    value: String,
}

/// Identity advertised to peers and recorded in the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub ip: IpAddr,
    pub region: String,
}

impl NodeIdentity {
    /// Build the identity, detecting the outbound IP when none is configured.
    pub fn resolve<R: Rng + ?Sized>(
        node_ip: &str,
        region: &str,
        rng: &mut R,
    ) -> Result<Self, NodeIpError> {
        let ip = if node_ip.is_empty() {
            detect_local_ip()
        } else {
            node_ip.parse().map_err(|_| NodeIpError {
                value: node_ip.to_string(),
            })?
        };

        Ok(Self {
            id: NodeId::generate(rng),
            ip,
            region: region.to_string(),
        })
    }
}

/// Find the address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only asks the kernel to pick a
/// route. Falls back to loopback when no route exists.
pub fn detect_local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) | Err(_) => {
            tracing::warn!("Could not detect node IP, advertising loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_node_id_format() {
        let mut rng = StdRng::seed_from_u64(42);
        let id = NodeId::generate(&mut rng);
        assert!(id.as_str().starts_with("ND_"));
        assert_eq!(id.as_str().len(), 15);
        assert!(id.as_str()[3..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_same_seed_same_id() {
        let a = NodeId::generate(&mut StdRng::seed_from_u64(9));
        let b = NodeId::generate(&mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolve_configured_ip() {
        let mut rng = StdRng::seed_from_u64(1);
        let identity = NodeIdentity::resolve("10.1.2.3", "us-west", &mut rng).unwrap();
        assert_eq!(identity.ip, "10.1.2.3".parse::<IpAddr>().unwrap());
        assert_eq!(identity.region, "us-west");

        assert!(NodeIdentity::resolve("not-an-ip", "", &mut rng).is_err());
    }

    #[test]
    fn test_detect_never_unspecified() {
        assert!(!detect_local_ip().is_unspecified());
    }
}
