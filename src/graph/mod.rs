//! Service graph: every subsystem of the server, wired leaves first.
//!
//! # Data Flow
//! ```text
//! build (inert, nothing spawned or bound):
//!     Backends + NodeIdentity + CredentialSet            (given)
//!     → feature stores   (ObjectStore capabilities)
//!     → Router, SignalRelay                               (routing)
//!     → WebhookNotifier, RoomAllocator
//!     → RoomManager → RoomService, Egress/Ingress/Sip/AgentDispatch services
//!     → HTTP API (router + listen addresses)
//!
//! start:  NotStarted → Running, bind, register node, keepalive, relay,
//!         webhook worker, serve
//! stop:   graceful → Draining … Stopped (reverse order)
//!         forced   → Stopped, serve dropped, node unregistered (bounded)
//! ```
//!
//! # Design Decisions
//! - Construction is all-or-nothing; a failure names the subsystem
//! - The graph is immutable after build; runtime state lives in the
//!   lifecycle cell, the shutdown coordinator, and the backends

mod runtime;

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::auth::CredentialSet;
use crate::backend::{Backends, DeploymentMode};
use crate::config::ServerConfig;
use crate::http::{build_router, listen_addrs, ApiState, HttpServer};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::state::StateCell;
use crate::node::NodeIdentity;
use crate::routing::{Router, SignalRelay};
use crate::services::{
    AgentDispatchService, EgressService, IngressService, RoomAllocator, RoomManager,
    RoomService, SipService, WebhookNotifier,
};

pub use runtime::StartError;

/// Construction failure, naming the subsystem that could not be built.
#[derive(Debug, thiserror::Error)]
#[error("failed to build {subsystem}: {source}")]
pub struct BuildError {
    pub subsystem: &'static str,
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
}

/// Wrap a fallible construction step so its error carries the subsystem name.
fn step<T, E>(subsystem: &'static str, result: Result<T, E>) -> Result<T, BuildError>
where
    E: StdError + Send + Sync + 'static,
{
    result.map_err(|e| BuildError {
        subsystem,
        source: Box::new(e),
    })
}

/// Subsystems in the order they are built.
pub const BUILD_ORDER: &[&str] = &[
    "backends",
    "feature_stores",
    "router",
    "signal_relay",
    "webhook",
    "room_allocator",
    "room_manager",
    "room_service",
    "egress_service",
    "ingress_service",
    "sip_service",
    "agent_dispatch_service",
    "http",
];

/// Comparable description of a built graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSummary {
    pub mode: DeploymentMode,
    pub node_id: String,
    pub region: String,
    pub listen_addrs: Vec<SocketAddr>,
    pub credential_keys: Vec<String>,
    pub webhooks_enabled: bool,
    pub features: Vec<(&'static str, bool)>,
    pub subsystems: Vec<&'static str>,
}

pub struct ServiceGraph {
    identity: NodeIdentity,
    credentials: CredentialSet,
    backends: Backends,
    router: Arc<Router>,
    relay: Arc<SignalRelay>,
    webhooks: Arc<WebhookNotifier>,
    rooms: Arc<RoomService>,
    egress: Arc<EgressService>,
    ingress: Arc<IngressService>,
    sip: Arc<SipService>,
    agents: Arc<AgentDispatchService>,
    http: HttpServer,
    state: Arc<StateCell>,
    started: AtomicBool,
    shutdown: Shutdown,
}

impl ServiceGraph {
    /// Construct every subsystem in dependency order.
    pub fn build(
        conf: &ServerConfig,
        identity: NodeIdentity,
        credentials: CredentialSet,
        backends: Backends,
    ) -> Result<Self, BuildError> {
        let store = backends.store().clone();
        let bus = backends.bus().clone();

        let egress_store = store.egress_store();
        let ingress_store = store.ingress_store();
        let sip_store = store.sip_store();
        let agent_store = store.agent_store();

        let router = Arc::new(step(
            "router",
            Router::new(identity.clone(), store.clone(), bus.clone(), &conf.node_stats),
        )?);
        let relay = Arc::new(SignalRelay::new(
            identity.id.clone(),
            bus,
            &conf.signal_relay,
        ));

        let webhooks = Arc::new(step(
            "webhook",
            WebhookNotifier::new(&conf.webhook, &credentials),
        )?);
        let allocator = step(
            "room_allocator",
            RoomAllocator::new(&conf.room, identity.id.as_str()),
        )?;

        let room_manager = Arc::new(RoomManager::new(store, router.clone(), allocator));
        let rooms = Arc::new(RoomService::new(room_manager.clone(), webhooks.clone()));
        let egress = Arc::new(EgressService::new(egress_store, room_manager.clone()));
        let ingress = Arc::new(IngressService::new(ingress_store, &conf.ingress));
        let sip = Arc::new(SipService::new(sip_store));
        let agents = Arc::new(AgentDispatchService::new(agent_store, room_manager));

        let state = Arc::new(StateCell::new());
        let addrs = step("http", listen_addrs(&conf.bind_addresses, conf.port))?;
        let api = build_router(
            ApiState {
                mode: backends.mode(),
                lifecycle: state.clone(),
                router: router.clone(),
                rooms: rooms.clone(),
                egress: egress.clone(),
                ingress: ingress.clone(),
                sip: sip.clone(),
                agents: agents.clone(),
            },
            credentials.clone(),
        );

        tracing::debug!(
            mode = %backends.mode(),
            node_id = %identity.id,
            subsystems = BUILD_ORDER.len(),
            "Service graph built"
        );

        Ok(Self {
            identity,
            credentials,
            backends,
            router,
            relay,
            webhooks,
            rooms,
            egress,
            ingress,
            sip,
            agents,
            http: HttpServer::new(api, addrs),
            state,
            started: AtomicBool::new(false),
            shutdown: Shutdown::new(),
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn mode(&self) -> DeploymentMode {
        self.backends.mode()
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn relay(&self) -> &Arc<SignalRelay> {
        &self.relay
    }

    pub fn rooms(&self) -> &Arc<RoomService> {
        &self.rooms
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            mode: self.backends.mode(),
            node_id: self.identity.id.to_string(),
            region: self.identity.region.clone(),
            listen_addrs: self.http.addrs().to_vec(),
            credential_keys: self.credentials.keys().map(str::to_string).collect(),
            webhooks_enabled: self.webhooks.is_enabled(),
            features: vec![
                ("egress", self.egress.is_available()),
                ("ingress", self.ingress.is_available()),
                ("sip", self.sip.is_available()),
                ("agents", self.agents.is_available()),
            ],
            subsystems: BUILD_ORDER.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn inputs(seed: u64) -> (NodeIdentity, CredentialSet) {
        let identity =
            NodeIdentity::resolve("127.0.0.1", "test", &mut StdRng::seed_from_u64(seed)).unwrap();
        let credentials =
            CredentialSet::new(BTreeMap::from([("key".to_string(), "secret".to_string())]))
                .unwrap();
        (identity, credentials)
    }

    #[tokio::test]
    async fn test_build_is_deterministic() {
        let conf = ServerConfig::default();
        let (identity, credentials) = inputs(1);
        let a = ServiceGraph::build(
            &conf,
            identity.clone(),
            credentials.clone(),
            Backends::standalone(),
        )
        .unwrap();
        let b = ServiceGraph::build(&conf, identity, credentials, Backends::standalone()).unwrap();
        assert_eq!(a.summary(), b.summary());
    }

    #[tokio::test]
    async fn test_standalone_features() {
        let (identity, credentials) = inputs(2);
        let graph = ServiceGraph::build(
            &ServerConfig::default(),
            identity,
            credentials,
            Backends::standalone(),
        )
        .unwrap();
        let summary = graph.summary();
        assert_eq!(summary.mode, DeploymentMode::Standalone);
        assert_eq!(
            summary.features,
            vec![
                ("egress", false),
                ("ingress", false),
                ("sip", false),
                ("agents", true)
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_names_subsystem() {
        let (identity, credentials) = inputs(3);

        let mut conf = ServerConfig::default();
        conf.webhook.urls = vec!["http://127.0.0.1:9/hook".into()];
        conf.webhook.api_key = "other".into();
        let err = ServiceGraph::build(&conf, identity.clone(), credentials.clone(), Backends::standalone())
            .err()
            .unwrap();
        assert_eq!(err.subsystem, "webhook");

        let mut conf = ServerConfig::default();
        conf.node_stats.update_interval_secs = 0;
        let err = ServiceGraph::build(&conf, identity.clone(), credentials.clone(), Backends::standalone())
            .err()
            .unwrap();
        assert_eq!(err.subsystem, "router");

        let mut conf = ServerConfig::default();
        conf.room.empty_timeout_secs = 0;
        let err = ServiceGraph::build(&conf, identity.clone(), credentials.clone(), Backends::standalone())
            .err()
            .unwrap();
        assert_eq!(err.subsystem, "room_allocator");

        let mut conf = ServerConfig::default();
        conf.bind_addresses = vec!["not-an-ip".into()];
        let err = ServiceGraph::build(&conf, identity, credentials, Backends::standalone())
            .err()
            .unwrap();
        assert_eq!(err.subsystem, "http");
    }
}
