//! Supervisor module tests.

mod runner_test;

/// Verify all public supervisor types are exported from the library.
#[test]
fn all_supervisor_types_exported() {
    use rcman::supervisor::{
        event_channel, Lifecycle, RunState, Status, StopDecision, Supervisor, SupervisorError,
        UiEvent,
    };

    let _ = Lifecycle::new();
    let _ = RunState::Idle;
    let _ = Status::Ready;
    let _ = StopDecision::NotRunning;
    let _ = UiEvent::ControlsRestored;
    let _: fn() -> SupervisorError = || SupervisorError::AlreadyRunning;

    let (tx, _rx) = event_channel();
    let _ = Supervisor::new(tx, None);
}
