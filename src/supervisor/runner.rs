//! Supervisor runner for robocopy invocations.
//!
//! Owns the single invocation slot: starts the external process, drains its
//! combined output on a background task into the log sink and the observer
//! channel, and carries the cooperative stop request into the drain loop.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::logs::{LogError, LogSink};
use crate::robocopy::{describe_exit_code, render_command, RobocopyProcess, SpawnError};
use crate::supervisor::{EventSender, Lifecycle, RunState, Status, StopDecision, UiEvent};

/// Default delay before a pending stop escalates to a forced kill.
pub const DEFAULT_STOP_ESCALATION: Duration = Duration::from_secs(5);

/// Error type for supervisor operations.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// `start` was called while an invocation is active.
    #[error("A robocopy process is already running")]
    AlreadyRunning,
    /// `stop` was called with nothing active.
    #[error("No robocopy process is currently running")]
    NotRunning,
    /// The process could not be launched.
    #[error("Failed to launch robocopy: {0}")]
    Launch(#[from] SpawnError),
    /// The log sink could not be opened.
    #[error(transparent)]
    Log(#[from] LogError),
}

/// The single invocation slot, guarded by one lock so the start guard and
/// the drain loop's terminal cleanup cannot race.
struct Slot {
    lifecycle: Lifecycle,
    cancel: Option<CancellationToken>,
    last_exit: Option<i32>,
}

/// Supervisor for at most one concurrent robocopy invocation.
///
/// Cloning shares the slot; any clone may issue `start` or `stop`.
#[derive(Clone)]
pub struct Supervisor {
    slot: Arc<Mutex<Slot>>,
    events: EventSender,
    stop_escalation: Option<Duration>,
}

impl Supervisor {
    /// Create a supervisor emitting events onto `events`.
    ///
    /// `stop_escalation` bounds how long a cooperative stop waits before
    /// the child is killed; `None` preserves cooperative-only semantics.
    #[must_use]
    pub fn new(events: EventSender, stop_escalation: Option<Duration>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                lifecycle: Lifecycle::new(),
                cancel: None,
                last_exit: None,
            })),
            events,
            stop_escalation,
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> RunState {
        self.slot.lock().await.lifecycle.state()
    }

    /// Exit code of the most recently completed invocation.
    ///
    /// `None` while an invocation is active, before the first invocation,
    /// or when the process was terminated by a signal.
    pub async fn last_exit_code(&self) -> Option<i32> {
        self.slot.lock().await.last_exit
    }

    /// Start a robocopy invocation, logging to a new file under `logs_dir`.
    ///
    /// The slot is claimed atomically before any blocking work; the drain
    /// loop then runs on a background task and the call returns immediately
    /// with the path of the log file.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if the slot is claimed (no side effects). Launch
    /// and log-open failures release the slot, surface a text event, and
    /// restore controls; no log file with content is left behind.
    pub async fn start(
        &self,
        args: Vec<String>,
        logs_dir: &Path,
    ) -> Result<PathBuf, SupervisorError> {
        self.claim_slot().await?;
        self.send_text(format!("Starting: {}\n", render_command(&args)));

        match self.launch(&args, logs_dir).await {
            Ok((process, sink)) => Ok(self.supervise(process, sink).await),
            Err(err) => Err(self.fail_start(err).await),
        }
    }

    /// Start an invocation logging into an already-open sink.
    ///
    /// The caller controls the log destination and its lifecycle; a spawn
    /// failure leaves the sink's file in place. `start` is the common path.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start), minus log-open failures.
    pub async fn start_with_sink(
        &self,
        args: Vec<String>,
        sink: LogSink,
    ) -> Result<PathBuf, SupervisorError> {
        self.claim_slot().await?;
        self.send_text(format!("Starting: {}\n", render_command(&args)));

        match RobocopyProcess::spawn(&args) {
            Ok(process) => Ok(self.supervise(process, sink).await),
            Err(err) => Err(self.fail_start(err.into()).await),
        }
    }

    /// Request cooperative termination of the active invocation.
    ///
    /// The first call while running wins; a repeat while termination is
    /// pending is an accepted no-op. Exit is observed by the drain loop,
    /// which also handles all cleanup.
    ///
    /// # Errors
    ///
    /// `NotRunning` if no invocation is active.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let mut slot = self.slot.lock().await;
        match slot.lifecycle.request_stop() {
            StopDecision::Requested => {
                if let Some(cancel) = &slot.cancel {
                    cancel.cancel();
                }
                Ok(())
            }
            StopDecision::AlreadyPending => Ok(()),
            StopDecision::NotRunning => Err(SupervisorError::NotRunning),
        }
    }

    /// Claim the slot atomically, with no side effects on rejection.
    async fn claim_slot(&self) -> Result<(), SupervisorError> {
        let mut slot = self.slot.lock().await;
        if slot.lifecycle.try_begin_start() {
            slot.last_exit = None;
            Ok(())
        } else {
            Err(SupervisorError::AlreadyRunning)
        }
    }

    /// Hand the launched process to the background drain task.
    async fn supervise(&self, process: RobocopyProcess, sink: LogSink) -> PathBuf {
        let cancel = CancellationToken::new();
        {
            let mut slot = self.slot.lock().await;
            slot.lifecycle.mark_running();
            slot.cancel = Some(cancel.clone());
        }
        self.send(UiEvent::Status(Status::Running));
        tracing::info!(log = %sink.path().display(), "Robocopy invocation started");

        let log_path = sink.path().to_path_buf();
        let drain = DrainTask {
            slot: Arc::clone(&self.slot),
            events: self.events.clone(),
            stop_escalation: self.stop_escalation,
        };
        tokio::spawn(drain.run(process, sink, cancel));
        log_path
    }

    /// Release the slot and surface a launch-phase failure.
    async fn fail_start(&self, err: SupervisorError) -> SupervisorError {
        {
            let mut slot = self.slot.lock().await;
            slot.lifecycle.reset();
        }
        tracing::warn!(error = %err, "Robocopy launch failed");
        self.send_text(format!("Error: {err}\n"));
        self.send(UiEvent::Status(Status::Ready));
        self.send(UiEvent::ControlsRestored);
        err
    }

    /// Open the log sink and spawn the process. A spawn failure removes
    /// the just-created log file.
    async fn launch(
        &self,
        args: &[String],
        logs_dir: &Path,
    ) -> Result<(RobocopyProcess, LogSink), SupervisorError> {
        let sink = LogSink::create(logs_dir).await?;
        match RobocopyProcess::spawn(args) {
            Ok(process) => Ok((process, sink)),
            Err(err) => {
                if let Err(remove_err) = sink.discard().await {
                    tracing::warn!(error = %remove_err, "Failed to remove log of failed launch");
                }
                Err(err.into())
            }
        }
    }

    fn send(&self, event: UiEvent) {
        let _ = self.events.send(event);
    }

    fn send_text(&self, text: impl Into<String>) {
        self.send(UiEvent::Text(text.into()));
    }
}

/// One unit read from the child's combined output.
enum Drained {
    Line(String),
    ReadFault(std::io::Error),
}

/// Progress of a pending stop, carried from the drain loop into the exit
/// wait so a cancel arriving after the pipes close is never missed.
#[derive(Default)]
struct StopProgress {
    terminate_sent: bool,
    killed: bool,
}

/// Outcome of one round of waiting on the child after the pipes closed.
enum Waited {
    Exited(std::io::Result<ExitStatus>),
    StopRequested,
    KillDue,
}

/// Background drain loop state for one invocation.
struct DrainTask {
    slot: Arc<Mutex<Slot>>,
    events: EventSender,
    stop_escalation: Option<Duration>,
}

impl DrainTask {
    /// Drain the child's output to the log sink and observer, observe exit,
    /// then release the slot and restore controls. Cleanup runs on every
    /// exit path.
    async fn run(self, mut process: RobocopyProcess, mut sink: LogSink, cancel: CancellationToken) {
        let mut lines = line_channel(&mut process);
        let kill_token = CancellationToken::new();
        let mut stop = StopProgress::default();
        let mut log_error_reported = false;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled(), if !stop.terminate_sent => {
                    self.deliver_terminate(&mut process, &kill_token, &mut stop);
                }

                () = kill_token.cancelled(), if stop.terminate_sent && !stop.killed => {
                    self.deliver_kill(&mut process, &mut stop);
                }

                drained = lines.recv() => {
                    let Some(drained) = drained else { break };
                    match drained {
                        Drained::Line(line) => {
                            if let Err(e) = sink.append_line(&line).await {
                                // Display keeps working even when logging fails.
                                if !log_error_reported {
                                    log_error_reported = true;
                                    self.send_text(format!(
                                        "Error writing log {}: {e}\n",
                                        sink.path().display()
                                    ));
                                }
                            }
                            let _ = self.events.send(UiEvent::Text(line));
                        }
                        Drained::ReadFault(e) => {
                            self.send_text(format!("Error reading robocopy output: {e}\n"));
                        }
                    }
                }
            }
        }

        let exit = self
            .wait_for_exit(&mut process, &cancel, &kill_token, &mut stop)
            .await;
        let (message, exit_code) = match exit {
            Ok(status) => (exit_message(status), status.code()),
            Err(e) => (format!("Error: failed to observe robocopy exit: {e}\n"), None),
        };
        self.send_text(message);
        drop(sink);

        {
            let mut slot = self.slot.lock().await;
            slot.lifecycle.reset();
            slot.cancel = None;
            slot.last_exit = exit_code;
        }
        let _ = self.events.send(UiEvent::Status(Status::Ready));
        let _ = self.events.send(UiEvent::ControlsRestored);
    }

    /// Wait for exit while still honoring stop requests. A child that has
    /// closed its pipes but keeps running can be terminated and, when
    /// escalation is configured, killed after the escalation delay.
    async fn wait_for_exit(
        &self,
        process: &mut RobocopyProcess,
        cancel: &CancellationToken,
        kill_token: &CancellationToken,
        stop: &mut StopProgress,
    ) -> std::io::Result<ExitStatus> {
        loop {
            // Handlers run outside the select so the wait future's borrow
            // of the process has ended by the time a signal is delivered.
            let waited = tokio::select! {
                biased;

                () = cancel.cancelled(), if !stop.terminate_sent => Waited::StopRequested,

                () = kill_token.cancelled(), if stop.terminate_sent && !stop.killed => {
                    Waited::KillDue
                }

                status = process.wait() => Waited::Exited(status),
            };
            match waited {
                Waited::Exited(status) => return status,
                Waited::StopRequested => self.deliver_terminate(process, kill_token, stop),
                Waited::KillDue => self.deliver_kill(process, stop),
            }
        }
    }

    /// Send the one cooperative terminate request and arm escalation.
    fn deliver_terminate(
        &self,
        process: &mut RobocopyProcess,
        kill_token: &CancellationToken,
        stop: &mut StopProgress,
    ) {
        stop.terminate_sent = true;
        match process.request_terminate() {
            Ok(()) => self.send_text("Sent terminate signal to robocopy\n"),
            Err(e) => self.send_text(format!("Error stopping robocopy: {e}\n")),
        }
        if let Some(after) = self.stop_escalation {
            let kt = kill_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                kt.cancel();
            });
        }
    }

    fn deliver_kill(&self, process: &mut RobocopyProcess, stop: &mut StopProgress) {
        stop.killed = true;
        tracing::warn!("Robocopy ignored the terminate request; killing it");
        match process.kill_now() {
            Ok(()) => self.send_text("Terminate request timed out; robocopy killed\n"),
            Err(e) => self.send_text(format!("Error killing robocopy: {e}\n")),
        }
    }

    fn send_text(&self, text: impl Into<String>) {
        let _ = self.events.send(UiEvent::Text(text.into()));
    }
}

/// Format the final exit event, with robocopy's success banding.
fn exit_message(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!(
            "Process exited with code {code} ({})\n",
            describe_exit_code(code)
        ),
        None => "Process terminated by signal\n".to_string(),
    }
}

/// Merge both output pipes into one line channel. Reader tasks stop at
/// end-of-stream or on a read fault; the channel closes when both are done.
fn line_channel(process: &mut RobocopyProcess) -> mpsc::UnboundedReceiver<Drained> {
    let (tx, rx) = mpsc::unbounded_channel();
    if let Some(stdout) = process.take_stdout() {
        spawn_line_reader(stdout, tx.clone());
    }
    if let Some(stderr) = process.take_stderr() {
        spawn_line_reader(stderr, tx.clone());
    }
    drop(tx);
    rx
}

/// Read raw lines (trailing newline preserved) and forward them.
fn spawn_line_reader<R>(reader: R, tx: mpsc::UnboundedSender<Drained>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(Drained::Line(line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // A read fault ends this pipe; the fault itself is
                    // still surfaced to the observer.
                    let _ = tx.send(Drained::ReadFault(e));
                    break;
                }
            }
        }
    });
}
