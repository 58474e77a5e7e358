//! Process lifecycle state machine.
//!
//! ```text
//! NotStarted ──start──▶ Running ──stop(false)──▶ Draining ──drained──▶ Stopped
//!      │                   │                        │
//!      └──stop(any)────────┴──────stop(true)────────┴──────────────────▶ Stopped
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::observability::metrics;

/// Lifecycle state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    NotStarted = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl From<u8> for LifecycleState {
    fn from(val: u8) -> Self {
        match val {
            0 => LifecycleState::NotStarted,
            1 => LifecycleState::Running,
            2 => LifecycleState::Draining,
            _ => LifecycleState::Stopped,
        }
    }
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::NotStarted => "not_started",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for [`LifecycleState`] with checked transitions.
#[derive(Debug)]
pub struct StateCell {
    state: AtomicU8,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::NotStarted as u8),
        }
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. On failure returns the actual state.
    pub fn transition(
        &self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| metrics::record_lifecycle_state(to as u8))
            .map_err(LifecycleState::from)
    }

    /// Jump straight to `Stopped`, returning the previous state.
    pub fn force_stop(&self) -> LifecycleState {
        let prev = self.state.swap(LifecycleState::Stopped as u8, Ordering::AcqRel);
        metrics::record_lifecycle_state(LifecycleState::Stopped as u8);
        LifecycleState::from(prev)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
