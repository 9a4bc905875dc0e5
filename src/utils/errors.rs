// src/utils/errors.rs
//! Crate-wide error types
//!
//! Launch and validation failures are hard errors; worker crashes are
//! handled inside the supervisor and never reach the caller; stage failures
//! abort the current tick but leave the server ready for the next one.

use crate::pipeline::Stage;
use thiserror::Error;

/// Errors produced by the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to spawn {role} process: {reason}")]
    ProcessSpawnFailed { role: String, reason: String },

    #[error("could not launch the {role} process (timeout)")]
    LaunchTimeout { role: String },

    #[error("tick stalled in stage `{stage}`")]
    TickStalled { stage: Stage },

    #[error("queue `{name}` was opened read-only")]
    QueueReadOnly { name: String },

    #[error("not connected to the store (call connect first)")]
    NotConnected,

    #[error("invalid terrain kind `{0}`")]
    InvalidTerrain(String),

    #[error("invalid terrain mask `{0}`")]
    InvalidTerrainMask(char),

    #[error("invalid terrain data length {0} (expected 2500)")]
    InvalidTerrainLength(usize),

    #[error("invalid x/y coordinates (they must be between 0 and 49)")]
    InvalidCoordinates { x: i64, y: i64 },

    #[error("invalid room name `{0}`")]
    InvalidRoomName(String),

    #[error("room {0} doesn't appear to have any terrain data")]
    MissingTerrain(String),

    #[error("cannot add user in {0}: room does not have any controller")]
    RoomWithoutController(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("logging setup error: {0}")]
    Logging(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, ServerError>;
