// src/world/mod.rs
//! World state helpers
//!
//! Everything callers use to shape the simulated world outside the tick
//! loop: the terrain codec, the [`World`] facade over rooms, terrain,
//! room objects and bots, and the per-user [`User`] handle.

pub mod terrain;
pub mod user;
#[allow(clippy::module_inception)]
pub mod world;

pub use terrain::{TerrainKind, TerrainMatrix, ROOM_SIZE};
pub use user::{ConsoleEvent, Notification, User};
pub use world::{AddBotOptions, World};

/// Game-balance constants used when seeding world objects
pub mod constants {
    /// Energy a fresh spawn starts with
    pub const SPAWN_ENERGY_START: u64 = 300;
    /// Energy capacity of a spawn
    pub const SPAWN_ENERGY_CAPACITY: u64 = 300;
    /// Hit points of a spawn
    pub const SPAWN_HITS: u64 = 5000;
    /// Safe-mode ticks granted to a freshly claimed controller
    pub const CONTROLLER_SAFE_MODE: u64 = 20_000;
}
