// src/store/env.rs
//! Key/value cache with hash fields
//!
//! Mirrors the flat-string plus hash-field surface the workers share with
//! the coordinator: plain `get`/`set`, an atomic counter increment for the
//! game time, and `hset`/`hmget` for memory segments.

use dashmap::DashMap;
use std::collections::HashMap;

/// Well-known cache keys
pub mod keys {
    /// Global tick counter
    pub const GAME_TIME: &str = "gameTime";
    /// Per-user memory blob, suffixed with the user id
    pub const MEMORY: &str = "memory:";
    /// Per-user memory segments hash, suffixed with the user id
    pub const MEMORY_SEGMENTS: &str = "memorySegments:";
    /// Compressed terrain blob for all rooms
    pub const TERRAIN_DATA: &str = "terrainData";
    /// Cached list of reachable rooms
    pub const ACCESSIBLE_ROOMS: &str = "accessibleRooms";
    /// Cached per-room status map
    pub const ROOM_STATUS_DATA: &str = "roomStatusData";
}

/// String cache shared between coordinator and workers
#[derive(Default)]
pub struct EnvCache {
    values: DashMap<String, String>,
    hashes: DashMap<String, HashMap<String, String>>,
}

impl EnvCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Numeric read of a counter value; unset or unparsable reads as `None`.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Atomically add one to a counter value and return the new value.
    ///
    /// An unset or unparsable value counts as zero.
    pub fn increment(&self, key: &str) -> u64 {
        let mut entry = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| "0".to_string());
        let next = entry.parse::<u64>().unwrap_or(0) + 1;
        *entry = next.to_string();
        next
    }

    /// Set one field of a hash value
    pub fn hset(&self, key: &str, field: &str, value: impl Into<String>) {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.into());
    }

    /// Read several fields of a hash value, preserving request order
    pub fn hmget(&self, key: &str, fields: &[String]) -> Vec<Option<String>> {
        let hash = self.hashes.get(key);
        fields
            .iter()
            .map(|f| hash.as_ref().and_then(|h| h.get(f).cloned()))
            .collect()
    }

    /// Drop every value and hash
    pub fn clear(&self) {
        self.values.clear();
        self.hashes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let env = EnvCache::new();
        assert_eq!(env.get("missing"), None);
        env.set("k", "v");
        assert_eq!(env.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_increment_from_unset() {
        let env = EnvCache::new();
        assert_eq!(env.increment(keys::GAME_TIME), 1);
        assert_eq!(env.increment(keys::GAME_TIME), 2);
        assert_eq!(env.get_u64(keys::GAME_TIME), Some(2));
    }

    #[test]
    fn test_hash_fields() {
        let env = EnvCache::new();
        env.hset("segments:1", "0", "a");
        env.hset("segments:1", "2", "c");
        let got = env.hmget(
            "segments:1",
            &["0".to_string(), "1".to_string(), "2".to_string()],
        );
        assert_eq!(
            got,
            vec![Some("a".to_string()), None, Some("c".to_string())]
        );
    }
}
