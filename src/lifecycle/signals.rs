//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGINT, SIGTERM and SIGQUIT (Ctrl-C elsewhere)
//! - Forward each delivery into a channel of depth one
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Deliveries that find the channel full are dropped, matching a
//!   non-blocking notify
//! - Once the consumer drops its receiver, later signals are absorbed and
//!   have no effect on the process

use std::fmt;
use std::io;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A termination request delivered by the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
    Quit,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminationSignal::Interrupt => "SIGINT",
            TerminationSignal::Terminate => "SIGTERM",
            TerminationSignal::Quit => "SIGQUIT",
        })
    }
}

/// Receiving end of the termination signal channel.
pub struct TerminationSignals {
    rx: mpsc::Receiver<TerminationSignal>,
    listeners: Vec<JoinHandle<()>>,
}

impl TerminationSignals {
    /// Subscribe to process termination signals.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let (tx, rx) = mpsc::channel(1);
        let mut listeners = Vec::new();
        for (kind, sig) in [
            (SignalKind::interrupt(), TerminationSignal::Interrupt),
            (SignalKind::terminate(), TerminationSignal::Terminate),
            (SignalKind::quit(), TerminationSignal::Quit),
        ] {
            let mut stream = signal(kind)?;
            let tx = tx.clone();
            listeners.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if forward(&tx, sig).is_err() {
                        break;
                    }
                }
            }));
        }

        Ok(Self { rx, listeners })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(1);
        let listener = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if forward(&tx, TerminationSignal::Interrupt).is_err() {
                    break;
                }
            }
        });
        Ok(Self {
            rx,
            listeners: vec![listener],
        })
    }

    /// A signal source driven by the caller instead of the OS.
    pub fn manual() -> (mpsc::Sender<TerminationSignal>, Self) {
        let (tx, rx) = mpsc::channel(1);
        (
            tx,
            Self {
                rx,
                listeners: Vec::new(),
            },
        )
    }

    /// Wait for the next signal. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<TerminationSignal> {
        self.rx.recv().await
    }
}

impl Drop for TerminationSignals {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

/// Non-blocking forward. Errors only when the receiver is gone.
fn forward(
    tx: &mpsc::Sender<TerminationSignal>,
    sig: TerminationSignal,
) -> Result<(), mpsc::error::TrySendError<TerminationSignal>> {
    match tx.try_send(sig) {
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::debug!(signal = %sig, "Signal channel full, dropping delivery");
            Ok(())
        }
        other => other,
    }
}
