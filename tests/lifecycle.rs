//! Start and stop a standalone server over real loopback sockets.

use std::net::SocketAddr;
use std::time::Duration;

use std::sync::Arc;

use async_trait::async_trait;
use relay_server::backend::{
    Backends, DeploymentMode, LocalStore, MessageBus, StoreError, Subscription,
};
use relay_server::graph::StartError;
use relay_server::lifecycle::{
    LifecycleManager, LifecycleState, TerminationSignal, TerminationSignals,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

mod common;

const STOP_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_serves_authenticated_api_then_stops_gracefully() {
    let port = common::free_port();
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let graph = common::standalone_graph(&common::loopback_config(port), 1);
    let client = common::client();

    let server = tokio::spawn({
        let graph = graph.clone();
        async move { graph.start().await }
    });
    common::wait_until_serving(&client, addr).await;
    assert_eq!(graph.state(), LifecycleState::Running);

    let nodes = graph.backends().store().list_nodes().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].id, graph.identity().id.as_str());

    let rooms_url = format!("http://{addr}/rooms");
    let res = client.get(&rooms_url).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);

    let res = client
        .get(&rooms_url)
        .header("X-Api-Key", common::API_KEY)
        .header("X-Api-Secret", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);

    let res = client
        .post(&rooms_url)
        .header("X-Api-Key", common::API_KEY)
        .header("X-Api-Secret", common::API_SECRET)
        .json(&serde_json::json!({ "name": "lobby" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::CREATED);

    let res = client
        .get(format!("http://{addr}/egress"))
        .header("X-Api-Key", common::API_KEY)
        .header("X-Api-Secret", common::API_SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_IMPLEMENTED);

    graph.stop(false).await;
    let result = timeout(STOP_DEADLINE, server).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(graph.state(), LifecycleState::Stopped);

    let nodes = graph.backends().store().list_nodes().await.unwrap();
    assert!(nodes.is_empty());
    assert!(common::port_is_free(addr));
}

#[tokio::test]
async fn test_forced_stop_releases_node() {
    let port = common::free_port();
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let graph = common::standalone_graph(&common::loopback_config(port), 2);
    let client = common::client();

    let server = tokio::spawn({
        let graph = graph.clone();
        async move { graph.start().await }
    });
    common::wait_until_serving(&client, addr).await;

    graph.stop(true).await;
    assert_eq!(graph.state(), LifecycleState::Stopped);

    let result = timeout(STOP_DEADLINE, server).await.unwrap().unwrap();
    assert!(result.is_ok());
    let nodes = graph.backends().store().list_nodes().await.unwrap();
    assert!(nodes.is_empty());
}

#[tokio::test]
async fn test_signals_drive_manager_to_stopped() {
    let port = common::free_port();
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let graph = common::standalone_graph(&common::loopback_config(port), 3);
    let client = common::client();

    let (tx, signals) = TerminationSignals::manual();
    let manager = LifecycleManager::new(graph.clone());
    let run = tokio::spawn(manager.run(signals));
    common::wait_until_serving(&client, addr).await;

    tx.send(TerminationSignal::Terminate).await.unwrap();
    let result = timeout(STOP_DEADLINE, run).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(graph.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_second_signal_forces_stop_during_drain() {
    let port = common::free_port();
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let graph = common::standalone_graph(&common::loopback_config(port), 4);
    let client = common::client();

    let (tx, signals) = TerminationSignals::manual();
    let run = tokio::spawn(LifecycleManager::new(graph.clone()).run(signals));
    common::wait_until_serving(&client, addr).await;

    // A request whose body never completes keeps the graceful drain waiting.
    let mut stalled = TcpStream::connect(addr).await.unwrap();
    let head = format!(
        "POST /rooms HTTP/1.1\r\nHost: {addr}\r\nX-Api-Key: {}\r\nX-Api-Secret: {}\r\n\
         Content-Type: application/json\r\nContent-Length: 64\r\n\r\n{{",
        common::API_KEY,
        common::API_SECRET
    );
    stalled.write_all(head.as_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    tx.send(TerminationSignal::Terminate).await.unwrap();
    common::wait_for_state(&graph, LifecycleState::Draining).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!run.is_finished(), "drain should still be waiting on the open request");
    assert_eq!(graph.state(), LifecycleState::Draining);

    tx.send(TerminationSignal::Interrupt).await.unwrap();
    let result = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(graph.state(), LifecycleState::Stopped);

    let nodes = graph.backends().store().list_nodes().await.unwrap();
    assert!(nodes.is_empty());
    drop(stalled);
}

#[tokio::test]
async fn test_stop_before_start_never_binds() {
    let port = common::free_port();
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let graph = common::standalone_graph(&common::loopback_config(port), 5);

    graph.stop(false).await;
    assert_eq!(graph.state(), LifecycleState::Stopped);

    timeout(STOP_DEADLINE, graph.start()).await.unwrap().unwrap();
    assert!(common::port_is_free(addr));
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let port = common::free_port();
    let graph = common::standalone_graph(&common::loopback_config(port), 6);

    graph.stop(false).await;
    graph.start().await.unwrap();
    let err = graph.start().await.unwrap_err();
    assert!(matches!(err, StartError::AlreadyStarted(LifecycleState::Stopped)));
}

#[tokio::test]
async fn test_bind_failure_stops_graph() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();
    let graph = common::standalone_graph(&common::loopback_config(port), 7);

    let err = graph.start().await.unwrap_err();
    assert!(matches!(err, StartError::Http(_)));
    assert_eq!(graph.state(), LifecycleState::Stopped);
}

/// Standalone bus that accepts publishes but refuses every subscription.
struct RefusingBus;

#[async_trait]
impl MessageBus for RefusingBus {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::Standalone
    }

    async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
        Err(StoreError::NotFound {
            kind: "topic",
            key: topic.to_string(),
        })
    }
}

#[tokio::test]
async fn test_failed_start_unregisters_node() {
    let port = common::free_port();
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let backends =
        Backends::from_parts(Arc::new(LocalStore::new()), Arc::new(RefusingBus)).unwrap();
    let graph = common::graph_with_backends(&common::loopback_config(port), 8, backends);

    let err = graph.start().await.unwrap_err();
    assert!(matches!(err, StartError::Relay(_)));
    assert_eq!(graph.state(), LifecycleState::Stopped);

    let nodes = graph.backends().store().list_nodes().await.unwrap();
    assert!(nodes.is_empty());
    assert!(common::port_is_free(addr));
}
