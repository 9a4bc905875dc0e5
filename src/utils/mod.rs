// src/utils/mod.rs
//! Common utilities and helpers

pub mod config;
pub mod errors;
pub mod logging;

pub use self::config::{ServerConfig, TickConfig, WorkersConfig};
pub use errors::{Result, ServerError};
pub use logging::init_tracing;
