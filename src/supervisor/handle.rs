// src/supervisor/handle.rs
//! Worker roles, exit classification and the supervision state machine

use chrono::{DateTime, Utc};
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// The supervised worker roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    /// The shared store service
    Storage,
    /// Per-user script execution
    EngineRunner,
    /// Per-room state processing
    EngineProcessor,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Storage => "storage",
            WorkerRole::EngineRunner => "engine_runner",
            WorkerRole::EngineProcessor => "engine_processor",
        }
    }

    /// File name of the role's log under the log directory
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.as_str())
    }

    /// File name of the role's control FIFO under the run directory
    pub fn control_pipe_name(&self) -> String {
        format!("{}.ipc", self.as_str())
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Exited with a code
    Code(i32),
    /// Terminated by a signal
    Signal(i32),
}

impl WorkerExit {
    pub fn from_status(status: &ExitStatus) -> Self {
        match status.code() {
            Some(code) => WorkerExit::Code(code),
            None => WorkerExit::Signal(status.signal().unwrap_or(0)),
        }
    }
}

/// Supervision states of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionState {
    /// Being spawned
    Starting,
    /// Alive and supervised
    Running,
    /// Exited with code zero; not restarted
    ExitedClean,
    /// Exited with a non-zero code; restarted
    ExitedCrashed,
    /// Terminated by a signal; not restarted
    Killed,
}

impl SupervisionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisionState::Starting => "starting",
            SupervisionState::Running => "running",
            SupervisionState::ExitedClean => "exited_clean",
            SupervisionState::ExitedCrashed => "exited_crashed",
            SupervisionState::Killed => "killed",
        }
    }
}

/// The restart policy as a pure transition.
///
/// Only a crash (non-zero exit code) leads back to `Starting`; clean exits
/// and signal terminations end supervision for the process.
pub fn transition(exit: &WorkerExit) -> SupervisionState {
    match exit {
        WorkerExit::Code(0) => SupervisionState::ExitedClean,
        WorkerExit::Code(_) => SupervisionState::ExitedCrashed,
        WorkerExit::Signal(_) => SupervisionState::Killed,
    }
}

/// Point-in-time snapshot of a supervised worker
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub role: WorkerRole,
    pub pid: u32,
    pub state: SupervisionState,
    pub restarts: u32,
    pub started_at: DateTime<Utc>,
}
