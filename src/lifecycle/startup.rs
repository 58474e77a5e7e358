//! Startup orchestration.
//!
//! # Responsibilities
//! - Load credentials and resolve the node identity
//! - Select the backends and build the service graph
//! - Hand the graph to the lifecycle manager and serve until stopped
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and maps to exit status 1
//! - Nothing is bound or spawned until the graph is fully built

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;

use crate::auth::{load_credentials, CredentialError};
use crate::backend::{select_backends, BackendError, StoreError};
use crate::config::{ConfigError, ServerConfig};
use crate::graph::{BuildError, ServiceGraph, StartError};
use crate::lifecycle::signals::TerminationSignals;
use crate::lifecycle::LifecycleManager;
use crate::node::{NodeIdentity, NodeIpError};
use crate::observability::metrics;

/// Top-level error returned to `main`.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("credential error: {0}")]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Identity(#[from] NodeIpError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    Start(#[from] StartError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

impl ServerError {
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Build the graph described by `conf` without starting it.
pub async fn build_graph(conf: &ServerConfig, rng: &mut StdRng) -> Result<ServiceGraph, ServerError> {
    let key_file = Some(conf.key_file.as_str())
        .filter(|p| !p.is_empty())
        .map(Path::new);
    let credentials = load_credentials(&conf.keys, key_file, conf.development)?;

    let identity = NodeIdentity::resolve(&conf.node_ip, &conf.region, rng)?;
    tracing::info!(
        node_id = %identity.id,
        node_ip = %identity.ip,
        region = %identity.region,
        "Node identity resolved"
    );

    let backends = select_backends(&conf.redis).await?;

    Ok(ServiceGraph::build(conf, identity, credentials, backends)?)
}

/// Run the server until it is stopped by signals or fails.
pub async fn run_server(conf: ServerConfig, rng: &mut StdRng) -> Result<(), ServerError> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = conf.port,
        development = conf.development,
        "relay-server starting"
    );

    let graph = build_graph(&conf, rng).await?;

    if conf.prometheus.port != 0 {
        metrics::init_metrics(SocketAddr::new(
            Ipv4Addr::UNSPECIFIED.into(),
            conf.prometheus.port,
        ))?;
    }

    let signals = TerminationSignals::install().map_err(ServerError::Signals)?;
    LifecycleManager::new(Arc::new(graph)).run(signals).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
