// src/lib.rs
//! Botlab Server Library
//!
//! Embeddable private server for scriptable-bot world simulations: a tick
//! coordinator, work-distribution queues and a process supervisor over a
//! shared store.
//!
//! # Architecture
//!
//! The crate is structured into several key modules:
//!
//! - **server**: the `connect` / `start` / `tick` / `stop` caller surface
//! - **pipeline**: tick stages, per-run state and the stall watchdog
//! - **queue**: fan-out/fan-in work queues between coordinator and workers
//! - **supervisor**: worker process lifecycle and restart policy
//! - **store**: the embedded database, env cache and pub/sub
//! - **world**: terrain codec, world shaping and per-user handles
//! - **utils**: configuration, errors, logging

// Public module exports
pub mod pipeline;
pub mod queue;
pub mod server;
pub mod store;
pub mod supervisor;
pub mod utils;
pub mod world;

// Re-export commonly used types
pub use pipeline::{Stage, StageData, TickOptions};
pub use queue::{QueueMode, QueueService, WorkQueue};
pub use server::{SimServer, TickHook};
pub use store::{Driver, Storage};
pub use supervisor::{ProcessSupervisor, SupervisionState, WorkerHandle, WorkerRole};
pub use utils::config::ServerConfig;
pub use utils::errors::{Result, ServerError};
pub use world::{AddBotOptions, TerrainKind, TerrainMatrix, User, World};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
