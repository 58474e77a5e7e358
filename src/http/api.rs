//! API router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{api_auth_middleware, CredentialSet};
use crate::backend::DeploymentMode;
use crate::http::handlers;
use crate::lifecycle::state::StateCell;
use crate::routing::Router as NodeRouter;
use crate::services::{
    AgentDispatchService, EgressService, IngressService, RoomService, SipService,
};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Requests running past `timeout` are answered with 408.
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct ApiState {
    pub mode: DeploymentMode,
    pub lifecycle: Arc<StateCell>,
    pub router: Arc<NodeRouter>,
    pub rooms: Arc<RoomService>,
    pub egress: Arc<EgressService>,
    pub ingress: Arc<IngressService>,
    pub sip: Arc<SipService>,
    pub agents: Arc<AgentDispatchService>,
}

/// Build the Axum router with all middleware layers.
///
/// Everything except `/` and `/healthz` requires API credentials.
pub fn build_router(state: ApiState, credentials: CredentialSet) -> Router {
    let protected = Router::new()
        .route("/nodes", get(handlers::list_nodes))
        .route("/rooms", get(handlers::list_rooms).post(handlers::create_room))
        .route("/rooms/{name}", delete(handlers::delete_room))
        .route(
            "/rooms/{name}/agents",
            get(handlers::list_dispatches).post(handlers::create_dispatch),
        )
        .route("/rooms/{name}/agents/{id}", delete(handlers::delete_dispatch))
        .route("/egress", get(handlers::list_egress).post(handlers::start_egress))
        .route("/egress/{id}/stop", post(handlers::stop_egress))
        .route(
            "/ingress",
            get(handlers::list_ingress).post(handlers::create_ingress),
        )
        .route("/ingress/{id}", delete(handlers::delete_ingress))
        .route(
            "/sip/trunks",
            get(handlers::list_trunks).post(handlers::create_trunk),
        )
        .route("/sip/trunks/{id}", delete(handlers::delete_trunk))
        .route_layer(middleware::from_fn_with_state(
            credentials,
            api_auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::health))
        .route("/healthz", get(handlers::healthz))
        .merge(protected)
        .with_state(state)
        .layer(timeout_layer(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use axum::{body::Body, http::Request};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tower::ServiceExt;

    use crate::backend::Backends;
    use crate::config::{NodeStatsConfig, RoomConfig, WebhookConfig};
    use crate::config::schema::IngressConfig;
    use crate::lifecycle::LifecycleState;
    use crate::node::NodeIdentity;
    use crate::services::{RoomAllocator, RoomManager, WebhookNotifier};

    fn test_app() -> (Router, Arc<StateCell>) {
        let identity =
            NodeIdentity::resolve("127.0.0.1", "test", &mut StdRng::seed_from_u64(3)).unwrap();
        let credentials =
            CredentialSet::new(BTreeMap::from([("key".to_string(), "secret".to_string())]))
                .unwrap();
        let backends = Backends::standalone();
        let store = backends.store().clone();

        let router = Arc::new(
            NodeRouter::new(
                identity.clone(),
                store.clone(),
                backends.bus().clone(),
                &NodeStatsConfig::default(),
            )
            .unwrap(),
        );
        let allocator = RoomAllocator::new(&RoomConfig::default(), identity.id.as_str()).unwrap();
        let manager = Arc::new(RoomManager::new(store.clone(), router.clone(), allocator));
        let webhooks =
            Arc::new(WebhookNotifier::new(&WebhookConfig::default(), &credentials).unwrap());

        let lifecycle = Arc::new(StateCell::new());
        let state = ApiState {
            mode: backends.mode(),
            lifecycle: lifecycle.clone(),
            router,
            rooms: Arc::new(RoomService::new(manager.clone(), webhooks)),
            egress: Arc::new(EgressService::new(store.egress_store(), manager.clone())),
            ingress: Arc::new(IngressService::new(
                store.ingress_store(),
                &IngressConfig::default(),
            )),
            sip: Arc::new(SipService::new(store.sip_store())),
            agents: Arc::new(AgentDispatchService::new(store.agent_store(), manager)),
        };
        (build_router(state, credentials), lifecycle)
    }

    fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("X-Api-Key", "key")
            .header("X-Api-Secret", "secret")
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_follows_lifecycle() {
        let (app, lifecycle) = test_app();

        let res = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        lifecycle
            .transition(LifecycleState::NotStarted, LifecycleState::Running)
            .unwrap();
        let res = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_credentials() {
        let (app, _) = test_app();

        let res = app
            .clone()
            .oneshot(Request::get("/rooms").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .oneshot(authed("GET", "/rooms", Body::empty()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_room_lifecycle_over_api() {
        let (app, _) = test_app();

        let res = app
            .clone()
            .oneshot(authed("POST", "/rooms", Body::from(r#"{"name":"lobby"}"#)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .clone()
            .oneshot(authed("DELETE", "/rooms/lobby", Body::empty()))
            .await
            .unwrap();
        assert!(res.status().is_success());

        let res = app
            .oneshot(authed("DELETE", "/rooms/lobby", Body::empty()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(timeout_layer(Duration::from_millis(20)));

        let res = app
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_unsupported_features_return_501() {
        let (app, _) = test_app();
        for uri in ["/egress", "/ingress", "/sip/trunks"] {
            let res = app
                .clone()
                .oneshot(authed("GET", uri, Body::empty()))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED, "{uri}");
        }
    }
}
