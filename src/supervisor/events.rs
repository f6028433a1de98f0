//! Observer boundary for supervisor output.
//!
//! The drain loop runs on a background task and never calls into the UI
//! directly; it posts events onto an unbounded channel and the hosting
//! front-end consumes them on whatever loop it owns.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Coarse status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ready,
    Running,
}

/// Events the supervisor emits to its observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// A unit of text for the output pane: a verbatim child output line
    /// (trailing newline included) or a supervisor message.
    Text(String),
    /// Status bar change.
    Status(Status),
    /// The invocation slot is free again; start controls may be re-enabled.
    /// Fires exactly once per invocation, on every exit path.
    ControlsRestored,
}

/// Sending half handed to the supervisor.
pub type EventSender = mpsc::UnboundedSender<UiEvent>;

/// Receiving half consumed by the front-end.
pub type EventReceiver = mpsc::UnboundedReceiver<UiEvent>;

/// Create the observer channel.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
