//! Single-slot invocation lifecycle.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the single invocation slot.
///
/// A stop request is an overlay on `Running` rather than a distinct state;
/// the slot returns to `Idle` only through the drain loop's exit path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Idle,
    Starting,
    Running,
}

/// Outcome of a stop request against the current lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// Termination should be requested now.
    Requested,
    /// A termination request is already pending; do nothing.
    AlreadyPending,
    /// Nothing is running.
    NotRunning,
}

/// State machine guarding the single invocation slot.
///
/// All mutation goes through this type while it is held under one lock, so
/// the start guard and the drain loop's terminal cleanup cannot interleave.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: RunState,
    stop_requested: bool,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Claim the slot for a new invocation.
    ///
    /// Returns `false` without any state change unless the slot is `Idle`.
    pub fn try_begin_start(&mut self) -> bool {
        if self.state == RunState::Idle {
            self.transition(RunState::Starting);
            true
        } else {
            false
        }
    }

    /// Record that the child process handle was obtained.
    pub fn mark_running(&mut self) {
        self.transition(RunState::Running);
    }

    /// Release the slot after an invocation ends, on every exit path.
    pub fn reset(&mut self) {
        self.transition(RunState::Idle);
        self.stop_requested = false;
    }

    /// Evaluate a stop request. Only the first request while `Running`
    /// results in `Requested`; repeats are a pending no-op.
    pub fn request_stop(&mut self) -> StopDecision {
        if self.state != RunState::Running {
            return StopDecision::NotRunning;
        }
        if self.stop_requested {
            StopDecision::AlreadyPending
        } else {
            self.stop_requested = true;
            StopDecision::Requested
        }
    }

    fn transition(&mut self, to: RunState) {
        tracing::debug!(from = ?self.state, to = ?to, "Lifecycle transition");
        self.state = to;
    }
}
