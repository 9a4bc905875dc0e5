// src/pipeline/mod.rs
//! Tick pipeline building blocks
//!
//! A tick is a strictly sequential run through an ordered list of named
//! stages; each stage consumes the previous stage's output. Concurrency
//! exists within a stage (many workers draining one queue), never across
//! stages.
//!
//! ```text
//! start ─ get_users ─ add_users_to_queue ─ wait_for_users ─ get_rooms ─ ...
//!   │                                                                    │
//!   └── watchdog armed ───────────────────────────── finish: disarmed ───┘
//! ```
//!
//! The watchdog turns a stalled tick into a recoverable condition: on fire
//! it reports the stalled stage, resets every work queue and poisons the
//! run so a late-arriving stage result is discarded instead of applied.

pub mod run;
pub mod stage;
pub mod watchdog;

pub use run::{TickOptions, TickRun};
pub use stage::{Stage, StageData};
pub use watchdog::Watchdog;
