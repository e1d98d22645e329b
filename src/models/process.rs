//! Supervised process models: registry entries, exit outcomes, audit events.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry entry for a live child process.
///
/// Written before the child produces output and removed exactly once when
/// it exits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessRecord {
    /// OS process identifier.
    pub pid: u32,
    /// Command as passed to the spawner.
    pub command: String,
    /// Argument list.
    #[serde(default)]
    pub args: Vec<String>,
    /// Opaque run correlation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Opaque node correlation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Spawn timestamp.
    pub started_at: DateTime<Utc>,
}

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Process is running normally.
    Running,
    /// Graceful termination requested; force kill is armed.
    Terminating,
    /// Exit protocol completed.
    Terminated,
}

/// Termination signal escalation step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStep {
    /// Graceful termination request (`SIGTERM` on Unix).
    Terminate,
    /// Forced kill (`SIGKILL` on Unix).
    Kill,
}

/// A signal sent to a supervised process, timed from spawn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Escalation {
    /// Which step was taken.
    pub step: EscalationStep,
    /// Milliseconds elapsed since spawn.
    pub elapsed_ms: u64,
}

/// Value carried by the completion signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessExit {
    /// Exit code, absent when the process died from a signal.
    pub exit_code: Option<i32>,
    /// Name of the terminating signal (e.g. `SIGTERM`).
    pub signal: Option<String>,
    /// Whether the configured timeout fired.
    pub timed_out: bool,
    /// Whether `cancel()` was requested.
    pub cancelled: bool,
}

impl ProcessExit {
    /// Whether the process exited normally with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Audit record emitted once per completed process, after registry cleanup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessAuditEvent {
    /// OS process identifier.
    pub pid: u32,
    /// Command as passed to the spawner.
    pub command: String,
    /// Argument list.
    pub args: Vec<String>,
    /// Working directory, if one was set.
    pub cwd: Option<PathBuf>,
    /// Opaque run correlation identifier.
    pub run_id: Option<String>,
    /// Opaque node correlation identifier.
    pub node_id: Option<String>,
    /// Exit code, absent when the process died from a signal.
    pub exit_code: Option<i32>,
    /// Name of the terminating signal.
    pub signal: Option<String>,
    /// Wall-clock run time in milliseconds.
    pub duration_ms: u64,
    /// Whether the configured timeout fired.
    pub timed_out: bool,
    /// Whether `cancel()` was requested.
    pub cancelled: bool,
    /// Completion timestamp.
    pub finished_at: DateTime<Utc>,
}
