// src/utils/config.rs
//! Server configuration
//!
//! Layered configuration: built-in defaults, an optional `botlab` config
//! file in the working directory, then `BOTLAB_*` environment variables.

use crate::utils::errors::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server data directory
    pub path: PathBuf,

    /// Directory for worker process log files
    pub logdir: PathBuf,

    /// Port the storage worker listens on
    pub storage_port: u16,

    /// Optional mod manifest handed to workers
    pub modfile: Option<PathBuf>,

    /// Tick pipeline settings
    pub tick: TickConfig,

    /// Worker process settings
    pub workers: WorkersConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("server"),
            logdir: PathBuf::from("server/logs"),
            storage_port: 21025,
            modfile: None,
            tick: TickConfig::default(),
            workers: WorkersConfig::default(),
        }
    }
}

/// Tick pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Watchdog timeout for one whole tick, in milliseconds
    pub watchdog_timeout_ms: u64,

    /// How many ticks between refreshes of the reachable-rooms cache
    pub rooms_refresh_interval: u64,

    /// Cadence of the standalone tick loop, in milliseconds
    pub rate_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: 5_000,
            rooms_refresh_interval: 20,
            rate_ms: 1_000,
        }
    }
}

/// Worker process settings
///
/// Executable paths are optional: when unset the corresponding role is not
/// launched and the embedded store serves the coordinator directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Storage worker executable
    pub storage_exec: Option<PathBuf>,

    /// Runner worker executable
    pub runner_exec: Option<PathBuf>,

    /// Processor worker executable
    pub processor_exec: Option<PathBuf>,

    /// Storage readiness handshake timeout, in seconds
    pub handshake_timeout_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            storage_exec: None,
            runner_exec: None,
            processor_exec: None,
            handshake_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Load configuration from defaults, `botlab.{toml,yaml,json}` and
    /// `BOTLAB_*` environment variables.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("botlab").required(false))
            .add_source(config::Environment::with_prefix("BOTLAB").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Watchdog timeout as a [`Duration`]
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.tick.watchdog_timeout_ms)
    }

    /// Storage handshake timeout as a [`Duration`]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.workers.handshake_timeout_secs)
    }
}
