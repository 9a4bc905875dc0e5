// src/utils/logging.rs
//! Tracing initialization for the standalone binary

use crate::utils::errors::{Result, ServerError};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` when set and defaults to `info` otherwise.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| ServerError::Logging(e.to_string()))
}
