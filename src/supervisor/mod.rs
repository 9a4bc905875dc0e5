// src/supervisor/mod.rs
//! Worker process supervision
//!
//! The supervisor is the top of the process hierarchy. It launches the
//! three worker roles with their log files and control channel, observes
//! exits, and applies the restart policy:
//!
//! ```text
//! starting ──▶ running ──▶ exited_clean            (code 0, no restart)
//!                 │
//!                 ├──────▶ exited_crashed ──▶ starting   (restart)
//!                 │
//!                 └──────▶ killed                  (signal, no restart)
//! ```
//!
//! Crashed workers are restarted immediately and unconditionally; crashes
//! never surface to the tick caller.

pub mod handle;
#[allow(clippy::module_inception)]
pub mod supervisor;

pub use handle::{transition, SupervisionState, WorkerExit, WorkerHandle, WorkerRole};
pub use supervisor::{ProcessSupervisor, CONTROL_FIFO_ENV, STORAGE_READY};
