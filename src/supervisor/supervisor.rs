// src/supervisor/supervisor.rs
//! Process supervisor
//!
//! Launches worker processes with stdout/stderr redirected to an
//! append-mode log file and a control FIFO for readiness messages,
//! observes exits and applies the restart policy from [`transition`].
//! The parent-side log handle is closed before any restart decision is
//! acted on; each respawn reopens the log in append mode.

use crate::supervisor::handle::{
    transition, SupervisionState, WorkerExit, WorkerHandle, WorkerRole,
};
use crate::utils::errors::{Result, ServerError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::unistd::{mkfifo, Pid};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Environment variable carrying the control FIFO path to workers
pub const CONTROL_FIFO_ENV: &str = "CONTROL_FIFO";

/// Control message the storage worker sends once it accepts connections
pub const STORAGE_READY: &str = "storageLaunched";

struct WorkerEntry {
    role: WorkerRole,
    pid: AtomicU32,
    state: RwLock<SupervisionState>,
    restarts: AtomicU32,
    started_at: RwLock<DateTime<Utc>>,
}

impl WorkerEntry {
    fn new(role: WorkerRole) -> Self {
        Self {
            role,
            pid: AtomicU32::new(0),
            state: RwLock::new(SupervisionState::Starting),
            restarts: AtomicU32::new(0),
            started_at: RwLock::new(Utc::now()),
        }
    }

    fn pid(&self) -> u32 {
        self.pid.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> WorkerHandle {
        WorkerHandle {
            role: self.role,
            pid: self.pid(),
            state: *self.state.read(),
            restarts: self.restarts.load(Ordering::Relaxed),
            started_at: *self.started_at.read(),
        }
    }
}

/// Supervisor for the worker process set
pub struct ProcessSupervisor {
    logdir: PathBuf,
    rundir: PathBuf,
    table: Arc<DashMap<WorkerRole, Arc<WorkerEntry>>>,
    shutdown: CancellationToken,
}

impl ProcessSupervisor {
    /// `logdir` receives the per-role log files, `rundir` the control FIFOs.
    pub fn new(logdir: impl Into<PathBuf>, rundir: impl Into<PathBuf>) -> Self {
        Self {
            logdir: logdir.into(),
            rundir: rundir.into(),
            table: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    fn log_path(&self, role: WorkerRole) -> PathBuf {
        self.logdir.join(role.log_file_name())
    }

    fn control_pipe_path(&self, role: WorkerRole) -> PathBuf {
        self.rundir.join(role.control_pipe_name())
    }

    /// Launch a worker and keep it supervised.
    ///
    /// The environment is extended with [`CONTROL_FIFO_ENV`] pointing at the
    /// role's control FIFO. Returns a snapshot of the new handle.
    pub async fn start_process(
        &self,
        role: WorkerRole,
        exec_path: &Path,
        env: &HashMap<String, String>,
    ) -> Result<WorkerHandle> {
        tokio::fs::create_dir_all(&self.logdir).await?;
        tokio::fs::create_dir_all(&self.rundir).await?;

        let pipe_path = self.control_pipe_path(role);
        match mkfifo(&pipe_path, Mode::S_IRWXU) {
            Ok(()) | Err(nix::errno::Errno::EEXIST) => {}
            Err(e) => {
                return Err(ServerError::ProcessSpawnFailed {
                    role: role.to_string(),
                    reason: format!("mkfifo {}: {e}", pipe_path.display()),
                })
            }
        }

        let mut env = env.clone();
        env.insert(
            CONTROL_FIFO_ENV.to_string(),
            pipe_path.display().to_string(),
        );

        let log_path = self.log_path(role);
        let child = spawn_worker(role, exec_path, &env, &log_path)?;
        let pid = child.id().unwrap_or(0);

        let entry = Arc::new(WorkerEntry::new(role));
        entry.pid.store(pid, Ordering::Relaxed);
        *entry.state.write() = SupervisionState::Running;
        self.table.insert(role, Arc::clone(&entry));
        info!("[{role}] process {pid} started");

        tokio::spawn(monitor(
            Arc::clone(&entry),
            exec_path.to_path_buf(),
            env,
            log_path,
            self.shutdown.child_token(),
            child,
        ));

        Ok(entry.snapshot())
    }

    /// Wait for a specific control message from a role's FIFO.
    ///
    /// Used by `connect` to await the storage worker's [`STORAGE_READY`]
    /// announcement; the timeout is a hard failure.
    pub async fn await_message(
        &self,
        role: WorkerRole,
        expected: &str,
        timeout: Duration,
    ) -> Result<()> {
        let path = self.control_pipe_path(role);
        let receiver = pipe::OpenOptions::new().open_receiver(&path)?;
        let mut reader = BufReader::new(receiver);

        let wait = async {
            let mut line = String::new();
            loop {
                line.clear();
                let n = reader.read_line(&mut line).await?;
                if n == 0 {
                    // No writer attached yet (or it closed); poll again.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
                if line.trim() == expected {
                    debug!("[{role}] control message `{expected}` received");
                    return Ok(());
                }
                debug!("[{role}] ignoring control message `{}`", line.trim());
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(ServerError::LaunchTimeout {
                role: role.to_string(),
            }),
        }
    }

    /// Snapshot of a tracked worker
    pub fn status(&self, role: WorkerRole) -> Option<WorkerHandle> {
        self.table.get(&role).map(|e| e.snapshot())
    }

    /// Probe whether the tracked process for a role is alive
    pub fn is_running(&self, role: WorkerRole) -> bool {
        self.status(role)
            .filter(|h| h.pid != 0)
            .map(|h| kill(Pid::from_raw(h.pid as i32), None).is_ok())
            .unwrap_or(false)
    }

    /// Send SIGTERM to every tracked worker and stop restarting.
    pub fn stop_all(&self) {
        self.shutdown.cancel();
        for entry in self.table.iter() {
            let state = *entry.state.read();
            if matches!(
                state,
                SupervisionState::Starting | SupervisionState::Running
            ) {
                let pid = entry.pid();
                if pid != 0 {
                    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                        warn!("[{}] failed to signal process {pid}: {e}", entry.role);
                    } else {
                        info!("[{}] sent SIGTERM to process {pid}", entry.role);
                    }
                }
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        // Best-effort cleanup
        self.stop_all();
    }
}

/// Spawn one worker process with its log file attached.
///
/// The log is opened append-mode so restarts preserve prior contents. The
/// parent's handle is dropped on return, before any restart decision.
fn spawn_worker(
    role: WorkerRole,
    exec_path: &Path,
    env: &HashMap<String, String>,
    log_path: &Path,
) -> Result<Child> {
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    let log_err = log.try_clone()?;

    Command::new(exec_path)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()
        .map_err(|e| ServerError::ProcessSpawnFailed {
            role: role.to_string(),
            reason: e.to_string(),
        })
}

/// Exit observer for one worker.
///
/// Applies the supervision state machine on every exit and keeps respawning
/// for as long as the transition says `ExitedCrashed` and shutdown has not
/// been requested.
async fn monitor(
    entry: Arc<WorkerEntry>,
    exec_path: PathBuf,
    env: HashMap<String, String>,
    log_path: PathBuf,
    shutdown: CancellationToken,
    mut child: Child,
) {
    let role = entry.role;
    loop {
        let status = tokio::select! {
            _ = shutdown.cancelled() => None,
            status = child.wait() => Some(status),
        };
        let Some(status) = status else {
            // Deliberate stop; reap the process after stop_all's SIGTERM.
            let _ = child.wait().await;
            *entry.state.write() = SupervisionState::Killed;
            info!("[{role}] process {} stopped", entry.pid());
            return;
        };

        let exit = match status {
            Ok(status) => WorkerExit::from_status(&status),
            Err(e) => {
                error!("[{role}] failed to observe process exit: {e}");
                return;
            }
        };
        let pid = entry.pid();
        let next = transition(&exit);
        *entry.state.write() = next;

        match (next, exit) {
            (SupervisionState::ExitedCrashed, WorkerExit::Code(code))
                if !shutdown.is_cancelled() =>
            {
                error!("[{role}] process {pid} exited with code {code}, restarting...");
                *entry.state.write() = SupervisionState::Starting;
                match spawn_worker(role, &exec_path, &env, &log_path) {
                    Ok(new_child) => {
                        let new_pid = new_child.id().unwrap_or(0);
                        entry.pid.store(new_pid, Ordering::Relaxed);
                        entry.restarts.fetch_add(1, Ordering::Relaxed);
                        *entry.started_at.write() = Utc::now();
                        *entry.state.write() = SupervisionState::Running;
                        info!("[{role}] process {new_pid} started");
                        child = new_child;
                    }
                    Err(e) => {
                        error!("[{role}] restart failed: {e}");
                        *entry.state.write() = SupervisionState::ExitedCrashed;
                        return;
                    }
                }
            }
            (SupervisionState::ExitedClean, _) => {
                info!("[{role}] process {pid} stopped");
                return;
            }
            (SupervisionState::Killed, WorkerExit::Signal(signal)) => {
                info!("[{role}] process {pid} exited by signal {signal}");
                return;
            }
            _ => return,
        }
    }
}
