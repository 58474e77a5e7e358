//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use relay_server::auth::CredentialSet;
use relay_server::backend::Backends;
use relay_server::config::ServerConfig;
use relay_server::lifecycle::LifecycleState;
use relay_server::node::NodeIdentity;
use relay_server::ServiceGraph;

pub const API_KEY: &str = "integration-key";
pub const API_SECRET: &str = "integration-secret-with-enough-length";

/// Ask the OS for a loopback port that is currently free.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Configuration serving on a single loopback address.
pub fn loopback_config(port: u16) -> ServerConfig {
    let mut conf = ServerConfig::default();
    conf.port = port;
    conf.bind_addresses = vec!["127.0.0.1".to_string()];
    conf
}

pub fn credentials() -> CredentialSet {
    CredentialSet::new(BTreeMap::from([(
        API_KEY.to_string(),
        API_SECRET.to_string(),
    )]))
    .unwrap()
}

/// A standalone graph; must be called inside a Tokio runtime.
pub fn standalone_graph(conf: &ServerConfig, seed: u64) -> Arc<ServiceGraph> {
    graph_with_backends(conf, seed, Backends::standalone())
}

pub fn graph_with_backends(conf: &ServerConfig, seed: u64, backends: Backends) -> Arc<ServiceGraph> {
    let identity =
        NodeIdentity::resolve("127.0.0.1", "it", &mut StdRng::seed_from_u64(seed)).unwrap();
    Arc::new(ServiceGraph::build(conf, identity, credentials(), backends).unwrap())
}

/// HTTP client that never reuses connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Poll `GET /` until the server reports healthy.
pub async fn wait_until_serving(client: &reqwest::Client, addr: SocketAddr) {
    let url = format!("http://{addr}/");
    for _ in 0..100 {
        if let Ok(res) = client.get(&url).send().await {
            if res.status() == reqwest::StatusCode::OK {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server at {addr} never became healthy");
}

/// Poll until the graph reports `state`.
pub async fn wait_for_state(graph: &ServiceGraph, state: LifecycleState) {
    for _ in 0..100 {
        if graph.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("graph never reached {state}, still {}", graph.state());
}

/// True when nothing is listening on `addr`.
pub fn port_is_free(addr: SocketAddr) -> bool {
    TcpListener::bind(addr).is_ok()
}
