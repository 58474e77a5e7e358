//! Shutdown coordination for the server.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::lifecycle::signals::TerminationSignals;

/// How far shutdown has progressed. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    Running,
    Graceful,
    Forced,
}

/// A request to stop, produced by the termination handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownRequest {
    pub force: bool,
}

/// Coordinator for shutdown.
///
/// Backed by a watch channel so tasks that subscribe late still observe
/// the current phase.
pub struct Shutdown {
    tx: watch::Sender<ShutdownPhase>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ShutdownPhase::Running);
        Self { tx }
    }

    /// Subscribe to phase changes.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Advance to the graceful or forced phase.
    ///
    /// Returns `false` if shutdown had already reached that phase.
    pub fn trigger(&self, force: bool) -> bool {
        let next = if force {
            ShutdownPhase::Forced
        } else {
            ShutdownPhase::Graceful
        };
        self.tx.send_if_modified(|phase| {
            if next > *phase {
                *phase = next;
                true
            } else {
                false
            }
        })
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.tx.borrow()
    }

    /// Get the number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Task-side view of the shutdown phase.
#[derive(Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<ShutdownPhase>,
}

impl ShutdownListener {
    pub fn phase(&self) -> ShutdownPhase {
        *self.rx.borrow()
    }

    /// Resolve once any shutdown has been requested.
    pub async fn requested(&mut self) -> ShutdownPhase {
        self.wait_until(ShutdownPhase::Graceful).await
    }

    /// Resolve once a forced shutdown has been requested.
    pub async fn forced(&mut self) {
        self.wait_until(ShutdownPhase::Forced).await;
    }

    async fn wait_until(&mut self, target: ShutdownPhase) -> ShutdownPhase {
        match self.rx.wait_for(|phase| *phase >= target).await {
            Ok(phase) => *phase,
            // Coordinator dropped.
            Err(_) => ShutdownPhase::Forced,
        }
    }
}

/// Something that can be asked to stop, gracefully or by force.
#[async_trait]
pub trait Stoppable: Send + Sync + 'static {
    async fn stop(&self, force: bool);
}

/// Number of termination signals the handler acts on.
pub const HANDLED_SIGNALS: usize = 2;

/// Consume termination signals and turn them into stop requests.
///
/// The first signal requests a graceful stop, the second a forced one.
/// Each request runs on its own task so a slow graceful stop never blocks
/// escalation. After the second signal the handler returns and drops the
/// receiver; any further signal produces no stop request.
pub fn spawn_two_phase_handler(
    mut signals: TerminationSignals,
    target: Arc<dyn Stoppable>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for attempt in 0..HANDLED_SIGNALS {
            let Some(signal) = signals.recv().await else {
                return;
            };
            let request = ShutdownRequest { force: attempt > 0 };
            tracing::info!(signal = %signal, force = request.force, "exit requested, shutting down");

            let target = target.clone();
            tokio::spawn(async move { target.stop(request.force).await });
        }
        tracing::debug!("Termination handler finished, further signals are ignored");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::signals::TerminationSignal;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl Stoppable for Recorder {
        async fn stop(&self, force: bool) {
            self.calls.lock().unwrap().push(force);
        }
    }

    #[tokio::test]
    async fn test_two_signals_graceful_then_forced() {
        let recorder = Arc::new(Recorder::default());
        let (tx, signals) = TerminationSignals::manual();
        let handler = spawn_two_phase_handler(signals, recorder.clone());

        tx.send(TerminationSignal::Terminate).await.unwrap();
        tx.send(TerminationSignal::Interrupt).await.unwrap();
        handler.await.unwrap();

        // A third signal finds the receiver gone.
        assert!(tx.send(TerminationSignal::Quit).await.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls.iter().filter(|f| !**f).count(), 1);
        assert_eq!(calls.iter().filter(|f| **f).count(), 1);
    }

    #[tokio::test]
    async fn test_single_signal_is_graceful() {
        let recorder = Arc::new(Recorder::default());
        let (tx, signals) = TerminationSignals::manual();
        let handler = spawn_two_phase_handler(signals, recorder.clone());

        tx.send(TerminationSignal::Interrupt).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*recorder.calls.lock().unwrap(), vec![false]);
        assert!(!handler.is_finished());

        drop(tx);
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn test_phases_only_advance() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.subscribe();
        assert_eq!(listener.phase(), ShutdownPhase::Running);

        assert!(shutdown.trigger(true));
        assert!(!shutdown.trigger(false));
        assert_eq!(shutdown.phase(), ShutdownPhase::Forced);
        assert_eq!(listener.requested().await, ShutdownPhase::Forced);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_phase() {
        let shutdown = Shutdown::new();
        shutdown.trigger(false);
        let mut late = shutdown.subscribe();
        assert_eq!(late.requested().await, ShutdownPhase::Graceful);
        assert_eq!(shutdown.receiver_count(), 1);
    }
}
