//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_node_info` (gauge): 1, labelled with deployment mode
//! - `relay_lifecycle_state` (gauge): 0=not started, 1=running, 2=draining, 3=stopped
//! - `relay_rooms` (gauge): rooms hosted by this node
//! - `relay_room_events_total` (counter): room created/deleted
//! - `relay_keepalives_total` (counter): keepalive publications by outcome
//! - `relay_signals_relayed_total` (counter): relay messages by direction
//! - `relay_webhooks_total` (counter): webhook deliveries by outcome
//! - `relay_shutdown_requests_total` (counter): stop requests by phase
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op
//! - The Prometheus exporter is only installed when a port is configured

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_node_info(mode: &'static str) {
    metrics::gauge!("relay_node_info", "mode" => mode).set(1.0);
}

pub fn record_lifecycle_state(state: u8) {
    metrics::gauge!("relay_lifecycle_state").set(f64::from(state));
}

pub fn record_rooms(count: usize) {
    metrics::gauge!("relay_rooms").set(count as f64);
}

pub fn record_room_event(event: &'static str) {
    metrics::counter!("relay_room_events_total", "event" => event).increment(1);
}

pub fn record_keepalive(success: bool) {
    let outcome = if success { "ok" } else { "error" };
    metrics::counter!("relay_keepalives_total", "outcome" => outcome).increment(1);
}

pub fn record_signal_relayed(direction: &'static str) {
    metrics::counter!("relay_signals_relayed_total", "direction" => direction).increment(1);
}

pub fn record_webhook(outcome: &'static str) {
    metrics::counter!("relay_webhooks_total", "outcome" => outcome).increment(1);
}

pub fn record_shutdown_request(force: bool) {
    let phase = if force { "forced" } else { "graceful" };
    metrics::counter!("relay_shutdown_requests_total", "phase" => phase).increment(1);
}
