// src/server/mod.rs
//! The caller surface
//!
//! [`SimServer`] owns the embedded store, the work queues and the process
//! supervisor, and exposes the `connect` / `start` / `tick` / `stop`
//! lifecycle. The tick pipeline itself lives in [`tick`].

#[allow(clippy::module_inception)]
pub mod server;
pub mod tick;

pub use server::{SimServer, TickHook};
