//! Robocopy process spawning and control.
//!
//! Launches the external copy tool with both output pipes captured, and
//! provides cooperative termination (SIGTERM on Unix) with an optional
//! forced kill for callers that escalate.

use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Windows `CREATE_NO_WINDOW` creation flag; keeps the child from opening
/// a console window. Resolved at compile time rather than probed per call.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The argument vector was empty.
    #[error("Empty argument vector")]
    EmptyCommand,
    /// The robocopy binary was not found.
    #[error("Robocopy binary not found")]
    NotFound,
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Resolve the executable name to launch.
///
/// On Windows a bare `robocopy` token is replaced with the absolute
/// `System32` path when it exists, which avoids filesystem redirection
/// surprises when running from a packaged binary. Elsewhere the name is
/// returned unchanged.
#[must_use]
pub fn resolve_binary(name: &str) -> String {
    #[cfg(windows)]
    {
        use std::path::Path;
        let is_bare = Path::new(name).file_name().is_some_and(|f| {
            f.eq_ignore_ascii_case("robocopy") || f.eq_ignore_ascii_case("robocopy.exe")
        });
        if is_bare {
            let system_root =
                std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".to_string());
            let candidate = Path::new(&system_root).join("System32").join("robocopy.exe");
            if candidate.exists() {
                return candidate.to_string_lossy().into_owned();
            }
        }
    }
    name.to_string()
}

/// A running robocopy process with both output pipes captured.
#[derive(Debug)]
pub struct RobocopyProcess {
    child: Child,
}

impl RobocopyProcess {
    /// Spawn a process from an argument vector whose first element names
    /// the executable.
    ///
    /// Both stdout and stderr are captured; stdin is closed. No console
    /// window is opened on Windows.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the vector is empty or the process fails to
    /// spawn.
    pub fn spawn(args: &[String]) -> Result<Self, SpawnError> {
        let (binary, rest) = args.split_first().ok_or(SpawnError::EmptyCommand)?;
        let binary = resolve_binary(binary);

        let mut cmd = Command::new(&binary);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let child = cmd.spawn().map_err(SpawnError::from_io)?;
        tracing::debug!(binary = %binary, pid = ?child.id(), "Spawned robocopy process");

        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Request cooperative termination.
    ///
    /// On Unix this sends SIGTERM, letting the child exit on its own terms;
    /// on other platforms the OS offers no graceful request and the child
    /// is killed outright.
    ///
    /// # Errors
    ///
    /// Returns an error if the termination request cannot be delivered.
    pub fn request_terminate(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.id() {
                let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
                kill(nix_pid, Signal::SIGTERM)
                    .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
            } else {
                // Already exited.
                Ok(())
            }
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    /// Forcefully kill the process, without waiting for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub fn kill_now(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

/// Whether a robocopy exit code indicates success.
///
/// Robocopy reports a bitmask: codes below 8 mean the copy completed
/// (possibly with extra or mismatched files noted); 8 and above mean at
/// least one copy failed.
#[must_use]
pub fn exit_code_is_success(code: i32) -> bool {
    (0..8).contains(&code)
}

/// Short human-readable summary of a robocopy exit code.
#[must_use]
pub fn describe_exit_code(code: i32) -> &'static str {
    match code {
        0 => "no files copied",
        c if (1..8).contains(&c) && c & 1 != 0 => "files copied",
        1..=7 => "extra or mismatched files detected",
        8..=15 => "some files or directories could not be copied",
        16 => "serious error, no files copied",
        _ => "unknown exit code",
    }
}
