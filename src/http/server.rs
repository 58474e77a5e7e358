//! HTTP listeners for the API.
//!
//! # Responsibilities
//! - Resolve the listen addresses from configuration
//! - Bind one listener per address (only when the server starts)
//! - Serve the API on all of them until shutdown is requested
//!
//! # Design Decisions
//! - Addresses are validated at build time, sockets are opened at start
//! - Graceful shutdown stops accepting and waits for in-flight requests

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::Router;
use futures_util::future::join_all;
use tokio::net::TcpListener;

use crate::lifecycle::shutdown::ShutdownListener;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Listen addresses for `bind` (empty means all IPv4 interfaces).
pub fn listen_addrs(bind: &[String], port: u16) -> Result<Vec<SocketAddr>, HttpError> {
    if bind.is_empty() {
        return Ok(vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)]);
    }
    bind.iter()
        .map(|raw| {
            raw.parse::<IpAddr>()
                .map(|ip| SocketAddr::new(ip, port))
                .map_err(|_| HttpError::InvalidAddress(raw.clone()))
        })
        .collect()
}

/// HTTP server for the API.
pub struct HttpServer {
    app: Router,
    addrs: Vec<SocketAddr>,
}

impl HttpServer {
    pub fn new(app: Router, addrs: Vec<SocketAddr>) -> Self {
        Self { app, addrs }
    }

    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Open every listener, failing on the first address that cannot be bound.
    pub async fn bind(&self) -> Result<Vec<TcpListener>, HttpError> {
        let mut listeners = Vec::with_capacity(self.addrs.len());
        for addr in &self.addrs {
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|source| HttpError::Bind {
                    addr: *addr,
                    source,
                })?;
            listeners.push(listener);
        }
        Ok(listeners)
    }

    /// Serve on the given listeners until shutdown is requested.
    pub async fn serve(
        &self,
        listeners: Vec<TcpListener>,
        shutdown: ShutdownListener,
    ) -> io::Result<()> {
        let servers = listeners.into_iter().map(|listener| {
            let app = self.app.clone();
            let mut shutdown = shutdown.clone();
            async move {
                let addr = listener.local_addr()?;
                tracing::info!(address = %addr, "HTTP server starting");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        shutdown.requested().await;
                    })
                    .await?;
                tracing::info!(address = %addr, "HTTP server stopped");
                Ok::<_, io::Error>(())
            }
        });

        for result in join_all(servers).await {
            result?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addrs() {
        let addrs = listen_addrs(&[], 7880).unwrap();
        assert_eq!(addrs, vec!["0.0.0.0:7880".parse().unwrap()]);

        let addrs = listen_addrs(&["127.0.0.1".into(), "::1".into()], 9000).unwrap();
        assert_eq!(addrs[1], "[::1]:9000".parse().unwrap());

        assert!(listen_addrs(&["localhost".into()], 1).is_err());
    }
}
