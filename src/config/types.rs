//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logs::default_logs_dir;
use crate::supervisor::DEFAULT_STOP_ESCALATION;

/// Copy preset applied to every invocation (`/R`, `/W`, `/MT`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CopyPreset {
    /// Retry count per failed copy (`/R`).
    pub retries: u32,
    /// Wait between retries in seconds (`/W`).
    pub wait_secs: u32,
    /// Multithreaded copy width (`/MT`).
    pub threads: u32,
}

impl Default for CopyPreset {
    fn default() -> Self {
        // The "Fast Copy" preset: /E /MT:32 /R:1 /W:1.
        Self {
            retries: 1,
            wait_secs: 1,
            threads: 32,
        }
    }
}

/// Configuration for the manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Copy preset.
    pub preset: CopyPreset,
    /// Executable name or path; resolved against `System32` on Windows.
    pub binary: String,
    /// Logs directory; the platform data dir is used when unset.
    pub logs_dir: Option<PathBuf>,
    /// Seconds before a pending stop escalates to a forced kill.
    /// Zero keeps termination cooperative-only.
    pub stop_escalation_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            preset: CopyPreset::default(),
            binary: "robocopy".to_string(),
            logs_dir: None,
            stop_escalation_secs: DEFAULT_STOP_ESCALATION.as_secs(),
        }
    }
}

impl ManagerConfig {
    /// Effective logs directory.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.logs_dir.clone().unwrap_or_else(default_logs_dir)
    }

    /// Stop escalation delay, `None` when disabled.
    #[must_use]
    pub fn stop_escalation(&self) -> Option<Duration> {
        (self.stop_escalation_secs > 0).then(|| Duration::from_secs(self.stop_escalation_secs))
    }
}
