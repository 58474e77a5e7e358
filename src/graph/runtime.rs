//! Starting and stopping a built [`ServiceGraph`].

use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{AbortHandle, JoinHandle};

use super::ServiceGraph;
use crate::backend::StoreError;
use crate::http::HttpError;
use crate::lifecycle::shutdown::{ShutdownPhase, Stoppable};
use crate::lifecycle::state::LifecycleState;
use crate::observability::metrics;
use crate::services::webhook::WebhookError;

/// Upper bound on unregistering the node during a forced stop or failed start.
pub const FORCED_UNREGISTER_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("server already started (state {0})")]
    AlreadyStarted(LifecycleState),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("failed to register node: {0}")]
    Register(#[source] StoreError),

    #[error("failed to subscribe signal relay: {0}")]
    Relay(#[source] StoreError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("http server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Background tasks owned by a running graph.
struct Workers {
    keepalive: JoinHandle<()>,
    relay: JoinHandle<()>,
    webhook: JoinHandle<()>,
}

impl Workers {
    fn abort_handles(&self) -> Vec<AbortHandle> {
        vec![
            self.keepalive.abort_handle(),
            self.relay.abort_handle(),
            self.webhook.abort_handle(),
        ]
    }
}

impl ServiceGraph {
    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// Start all subsystems and serve until stopped.
    ///
    /// Returns once the graph reached `Stopped`. A stop requested before
    /// start makes this return immediately without binding anything.
    pub async fn start(&self) -> Result<(), StartError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StartError::AlreadyStarted(self.state.get()));
        }
        match self
            .state
            .transition(LifecycleState::NotStarted, LifecycleState::Running)
        {
            Ok(()) => {}
            Err(LifecycleState::Stopped) => {
                tracing::info!("Stop requested before start, not serving");
                return Ok(());
            }
            Err(other) => return Err(StartError::AlreadyStarted(other)),
        }
        metrics::record_node_info(self.mode().as_str());

        let (listeners, mut workers) = match self.start_subsystems().await {
            Ok(started) => started,
            Err(e) => {
                self.shutdown.trigger(true);
                self.state.force_stop();
                return Err(e);
            }
        };

        tracing::info!(
            node_id = %self.identity.id,
            mode = %self.mode(),
            addrs = ?self.http.addrs(),
            "Server started"
        );

        let aborts = workers.abort_handles();
        let mut forced = self.shutdown.subscribe();
        let result = tokio::select! {
            served = self.http.serve(listeners, self.shutdown.subscribe()) => {
                if self.shutdown.phase() == ShutdownPhase::Running {
                    // Serving ended without a stop request.
                    self.shutdown.trigger(false);
                }
                tokio::select! {
                    _ = self.drain(&mut workers) => {}
                    _ = forced.forced() => self.release_forced(&aborts).await,
                }
                served.map_err(StartError::from)
            }
            _ = forced.forced() => {
                self.release_forced(&aborts).await;
                Ok(())
            }
        };

        self.state.force_stop();
        tracing::info!("Server stopped");
        result
    }

    async fn start_subsystems(
        &self,
    ) -> Result<(Vec<tokio::net::TcpListener>, Workers), StartError> {
        let listeners = self.http.bind().await?;
        self.router
            .register_node()
            .await
            .map_err(StartError::Register)?;

        match self.start_workers().await {
            Ok(workers) => Ok((listeners, workers)),
            Err(e) => {
                // Registered but never served: leave the cluster again.
                self.unregister_bounded().await;
                Err(e)
            }
        }
    }

    async fn start_workers(&self) -> Result<Workers, StartError> {
        let relay = self
            .relay
            .start(self.shutdown.subscribe())
            .await
            .map_err(StartError::Relay)?;
        let webhook = match self.webhooks.start(self.shutdown.subscribe()) {
            Ok(handle) => handle,
            Err(e) => {
                relay.abort();
                return Err(e.into());
            }
        };
        let keepalive = self.router.spawn_keepalive(self.shutdown.subscribe());

        Ok(Workers {
            keepalive,
            relay,
            webhook,
        })
    }

    /// Graceful release after the HTTP servers finished, in reverse build order.
    async fn drain(&self, workers: &mut Workers) {
        tracing::debug!("Feature services released");

        if let Err(e) = (&mut workers.webhook).await {
            tracing::warn!(error = %e, "Webhook worker ended abnormally");
        }
        let _ = (&mut workers.keepalive).await;

        if let Err(e) = self.router.unregister_node().await {
            tracing::warn!(error = %e, "Failed to unregister node");
        }
        let _ = (&mut workers.relay).await;

        let _ = self
            .state
            .transition(LifecycleState::Draining, LifecycleState::Stopped);
    }

    /// Forced release: abandon queued work, still try to leave the cluster.
    async fn release_forced(&self, aborts: &[AbortHandle]) {
        for handle in aborts {
            handle.abort();
        }
        self.unregister_bounded().await;
    }

    async fn unregister_bounded(&self) {
        match tokio::time::timeout(FORCED_UNREGISTER_TIMEOUT, self.router.unregister_node()).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to unregister node"),
            Err(_) => tracing::warn!("Timed out unregistering node"),
        }
    }

    /// Request a stop. See [`Stoppable`].
    pub async fn stop(&self, force: bool) {
        metrics::record_shutdown_request(force);

        if force {
            if self.state.force_stop() == LifecycleState::Stopped {
                return;
            }
            tracing::warn!("Forced stop requested");
            self.shutdown.trigger(true);
            return;
        }

        match self
            .state
            .transition(LifecycleState::Running, LifecycleState::Draining)
        {
            Ok(()) => {}
            Err(LifecycleState::NotStarted) => {
                let _ = self
                    .state
                    .transition(LifecycleState::NotStarted, LifecycleState::Stopped);
                self.shutdown.trigger(false);
                return;
            }
            Err(state) => {
                tracing::debug!(state = %state, "Graceful stop ignored");
                return;
            }
        }

        tracing::info!("Draining");
        if let Err(e) = self.router.drain().await {
            tracing::warn!(error = %e, "Failed to mark node as shutting down");
        }
        self.shutdown.trigger(false);
    }
}

#[async_trait]
impl Stoppable for ServiceGraph {
    async fn stop(&self, force: bool) {
        ServiceGraph::stop(self, force).await
    }
}
