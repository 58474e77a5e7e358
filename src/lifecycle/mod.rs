//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Credentials → Identity → Backends → Metrics → ServiceGraph
//!     → TerminationSignals → LifecycleManager::run
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM/SIGQUIT → mpsc(1)
//!
//! Shutdown (shutdown.rs):
//!     1st signal → stop(false): Draining, listeners close, resources released
//!     2nd signal → stop(force): Stopped, serving abandoned
//!     3rd signal → ignored
//!
//! State (state.rs):
//!     NotStarted → Running → Draining → Stopped
//! ```
//!
//! # Design Decisions
//! - Graceful stop has no deadline; the second signal is the escape hatch
//! - Every stop request runs on its own task so escalation never waits

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

use std::sync::Arc;

use crate::graph::{ServiceGraph, StartError};

pub use shutdown::{
    spawn_two_phase_handler, Shutdown, ShutdownListener, ShutdownPhase, ShutdownRequest,
    Stoppable,
};
pub use signals::{TerminationSignal, TerminationSignals};
pub use startup::{run_server, ServerError};
pub use state::{LifecycleState, StateCell};

/// Ties termination signals to a service graph.
pub struct LifecycleManager {
    graph: Arc<ServiceGraph>,
}

impl LifecycleManager {
    pub fn new(graph: Arc<ServiceGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Arc<ServiceGraph> {
        &self.graph
    }

    /// Install the two-phase handler, then serve until the graph stops.
    pub async fn run(self, signals: TerminationSignals) -> Result<(), StartError> {
        let handler = spawn_two_phase_handler(signals, self.graph.clone());
        let result = self.graph.start().await;
        handler.abort();
        result
    }
}
