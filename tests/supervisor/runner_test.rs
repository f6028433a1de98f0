//! End-to-end supervisor tests against real child processes.

use std::time::Duration;

use rcman::supervisor::{
    event_channel, EventReceiver, RunState, Status, Supervisor, SupervisorError, UiEvent,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Receive events until the controls-restored marker arrives.
async fn collect_until_restored(rx: &mut EventReceiver) -> Vec<UiEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for supervisor events")
            .expect("event channel closed before controls were restored");
        let done = event == UiEvent::ControlsRestored;
        events.push(event);
        if done {
            return events;
        }
    }
}

fn text_lines(events: &[UiEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

fn statuses(events: &[UiEvent]) -> Vec<Status> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::Status(s) => Some(*s),
            _ => None,
        })
        .collect()
}

fn restored_count(events: &[UiEvent]) -> usize {
    events
        .iter()
        .filter(|e| **e == UiEvent::ControlsRestored)
        .count()
}

#[cfg(unix)]
#[tokio::test]
async fn echo_invocation_logs_and_reports_exit() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);

    let log = supervisor
        .start(vec!["echo".into(), "hello".into()], dir.path())
        .await
        .unwrap();
    let events = collect_until_restored(&mut rx).await;

    assert_eq!(std::fs::read_to_string(&log).unwrap(), "hello\n");
    let lines = text_lines(&events);
    assert!(lines.contains(&"hello\n"));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("Process exited with code 0")));
    assert_eq!(statuses(&events), vec![Status::Running, Status::Ready]);
    assert_eq!(restored_count(&events), 1);
    assert_eq!(supervisor.state().await, RunState::Idle);
    assert_eq!(supervisor.last_exit_code().await, Some(0));
}

#[cfg(unix)]
#[tokio::test]
async fn log_matches_displayed_lines_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);

    let script = r#"printf 'a\nb\nc\n'"#;
    let log = supervisor
        .start(vec!["sh".into(), "-c".into(), script.into()], dir.path())
        .await
        .unwrap();
    let events = collect_until_restored(&mut rx).await;

    let child_lines: String = text_lines(&events)
        .iter()
        .filter(|l| l.len() == 2)
        .copied()
        .collect();
    assert_eq!(child_lines, "a\nb\nc\n");
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "a\nb\nc\n");
}

#[cfg(unix)]
#[tokio::test]
async fn stderr_output_is_drained_and_logged() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);

    let script = r#"echo oops >&2"#;
    let log = supervisor
        .start(vec!["sh".into(), "-c".into(), script.into()], dir.path())
        .await
        .unwrap();
    let events = collect_until_restored(&mut rx).await;

    assert!(text_lines(&events).contains(&"oops\n"));
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "oops\n");
}

#[cfg(unix)]
#[tokio::test]
async fn nonzero_exit_is_reported_with_classification() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);

    supervisor
        .start(vec!["sh".into(), "-c".into(), "exit 16".into()], dir.path())
        .await
        .unwrap();
    let events = collect_until_restored(&mut rx).await;

    assert!(text_lines(&events)
        .iter()
        .any(|l| l.contains("exited with code 16") && l.contains("serious error")));
    assert_eq!(supervisor.state().await, RunState::Idle);
    assert_eq!(supervisor.last_exit_code().await, Some(16));
}

#[tokio::test]
async fn missing_binary_fails_launch_and_restores() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);

    let err = supervisor
        .start(vec!["rcman-missing-tool-xyz".into()], dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::Launch(_)));
    assert_eq!(supervisor.state().await, RunState::Idle);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(text_lines(&events).iter().any(|l| l.starts_with("Error:")));
    assert_eq!(restored_count(&events), 1);

    // No log file with content is left behind.
    let leftover: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftover.is_empty());
}

#[tokio::test]
async fn stop_before_start_is_not_running() {
    let (tx, _rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);
    assert!(matches!(
        supervisor.stop().await.unwrap_err(),
        SupervisorError::NotRunning
    ));
    assert_eq!(supervisor.state().await, RunState::Idle);
}

#[cfg(unix)]
#[tokio::test]
async fn second_start_is_rejected_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);

    supervisor
        .start(vec!["sleep".into(), "5".into()], dir.path())
        .await
        .unwrap();
    let err = supervisor
        .start(vec!["echo".into(), "nope".into()], dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning));

    supervisor.stop().await.unwrap();
    let events = collect_until_restored(&mut rx).await;
    assert_eq!(restored_count(&events), 1);
    assert_eq!(supervisor.state().await, RunState::Idle);
}

#[cfg(unix)]
#[tokio::test]
async fn concurrent_starts_admit_exactly_one() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);

    let a = supervisor.clone();
    let b = supervisor.clone();
    let dir_a = dir.path().to_path_buf();
    let dir_b = dir.path().to_path_buf();
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { a.start(vec!["sleep".into(), "5".into()], &dir_a).await }),
        tokio::spawn(async move { b.start(vec!["sleep".into(), "5".into()], &dir_b).await }),
    );
    let results = [ra.unwrap(), rb.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(SupervisorError::AlreadyRunning)))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(rejected, 1);

    supervisor.stop().await.unwrap();
    let events = collect_until_restored(&mut rx).await;
    assert_eq!(restored_count(&events), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn stop_terminates_a_running_invocation() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, Some(Duration::from_secs(10)));

    let log = supervisor
        .start(vec!["sleep".into(), "30".into()], dir.path())
        .await
        .unwrap();
    supervisor.stop().await.unwrap();

    let events = collect_until_restored(&mut rx).await;
    let lines = text_lines(&events);
    assert!(lines
        .iter()
        .any(|l| l.starts_with("Sent terminate signal")));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("Process terminated by signal")
            || l.starts_with("Process exited with code")));
    assert_eq!(supervisor.state().await, RunState::Idle);
    // Log was created even though the child produced no output.
    assert!(log.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn stop_after_pipes_close_still_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, Some(Duration::from_secs(10)));

    // Closes both output pipes right away, then lingers.
    let script = r#"exec >/dev/null 2>&1; sleep 30"#;
    supervisor
        .start(vec!["sh".into(), "-c".into(), script.into()], dir.path())
        .await
        .unwrap();

    // Give the readers time to hit end-of-stream before stopping.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let stopped_at = std::time::Instant::now();
    supervisor.stop().await.unwrap();

    let events = collect_until_restored(&mut rx).await;
    assert!(stopped_at.elapsed() < Duration::from_secs(5));
    assert!(text_lines(&events)
        .iter()
        .any(|l| l.starts_with("Sent terminate signal")));
    assert_eq!(restored_count(&events), 1);
    assert_eq!(supervisor.state().await, RunState::Idle);
}

#[cfg(unix)]
#[tokio::test]
async fn log_write_failure_is_reported_once_and_draining_continues() {
    use rcman::logs::LogSink;

    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);

    // Every write to /dev/full fails with ENOSPC.
    let sink = LogSink::at_path("/dev/full").await.unwrap();
    let script = r#"printf 'a\nb\nc\n'"#;
    supervisor
        .start_with_sink(vec!["sh".into(), "-c".into(), script.into()], sink)
        .await
        .unwrap();
    let events = collect_until_restored(&mut rx).await;

    let lines = text_lines(&events);
    let log_errors = lines
        .iter()
        .filter(|l| l.starts_with("Error writing log"))
        .count();
    assert_eq!(log_errors, 1);

    // Display still receives every child line, in order.
    let child_lines: String = lines.iter().filter(|l| l.len() == 2).copied().collect();
    assert_eq!(child_lines, "a\nb\nc\n");
    assert_eq!(restored_count(&events), 1);
    assert_eq!(supervisor.state().await, RunState::Idle);
}

#[cfg(unix)]
#[tokio::test]
async fn double_stop_sends_one_terminate_request() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);

    supervisor
        .start(vec!["sleep".into(), "30".into()], dir.path())
        .await
        .unwrap();
    supervisor.stop().await.unwrap();
    supervisor.stop().await.unwrap();

    let events = collect_until_restored(&mut rx).await;
    let terminate_requests = text_lines(&events)
        .iter()
        .filter(|l| l.starts_with("Sent terminate signal"))
        .count();
    assert_eq!(terminate_requests, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn output_before_termination_is_still_logged() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, Some(Duration::from_secs(10)));

    // Prints one line immediately, then lingers.
    let script = r#"echo started; sleep 30"#;
    let log = supervisor
        .start(vec!["sh".into(), "-c".into(), script.into()], dir.path())
        .await
        .unwrap();

    // Wait for the line to prove the child is producing output.
    loop {
        match tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
        {
            UiEvent::Text(t) if t == "started\n" => break,
            _ => {}
        }
    }

    supervisor.stop().await.unwrap();
    let _ = collect_until_restored(&mut rx).await;

    assert_eq!(std::fs::read_to_string(&log).unwrap(), "started\n");
    assert_eq!(supervisor.state().await, RunState::Idle);
}

#[cfg(unix)]
#[tokio::test]
async fn slot_is_reusable_after_completion() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, None);

    supervisor
        .start(vec!["echo".into(), "one".into()], dir.path())
        .await
        .unwrap();
    collect_until_restored(&mut rx).await;

    let log = supervisor
        .start(vec!["echo".into(), "two".into()], dir.path())
        .await
        .unwrap();
    collect_until_restored(&mut rx).await;
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "two\n");
}

#[cfg(unix)]
#[tokio::test]
async fn stop_escalates_when_the_child_ignores_sigterm() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = event_channel();
    let supervisor = Supervisor::new(tx, Some(Duration::from_millis(300)));

    // Traps and ignores SIGTERM; short-lived children so the output pipe
    // closes promptly once the shell is killed.
    let script = r#"trap '' TERM; echo ready; while true; do sleep 1; done"#;
    supervisor
        .start(vec!["sh".into(), "-c".into(), script.into()], dir.path())
        .await
        .unwrap();

    loop {
        match tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
        {
            UiEvent::Text(t) if t == "ready\n" => break,
            _ => {}
        }
    }

    supervisor.stop().await.unwrap();
    let events = collect_until_restored(&mut rx).await;
    assert!(text_lines(&events)
        .iter()
        .any(|l| l.contains("robocopy killed") || l.starts_with("Process terminated by signal")));
    assert_eq!(supervisor.state().await, RunState::Idle);
}
