// src/queue/mod.rs
//! Work-distribution queues
//!
//! Named fan-out/fan-in channels coordinating the tick pipeline with the
//! worker processes:
//!
//! ```text
//! coordinator ──add_multi──▶ [pending] ──fetch──▶ [in-flight] ──mark_done──▶ gone
//!      ▲                                                            │
//!      └───────────────── when_all_done barrier ◀────────────────────┘
//! ```
//!
//! The coordinator owns the write side (enqueue + barrier); workers own
//! per-item acknowledgment. `reset_all` is the watchdog's recovery action.

pub mod client;
pub mod service;

pub use client::{QueueMode, WorkQueue};
pub use service::{QueueService, QueueStats};
