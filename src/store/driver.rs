// src/store/driver.rs
//! Coordinator-side data-access facade
//!
//! The [`Driver`] is what the tick pipeline talks to: tick notifications,
//! active user/room queries, the write-behind bulk buffer flushed by the
//! commit stages, and the game-time counter. Worker processes reach the
//! same state through the storage worker; in embedded mode both sides share
//! this process.

use crate::queue::QueueService;
use crate::store::database::Database;
use crate::store::env::{keys, EnvCache};
use crate::store::pubsub::{channels, PubSub};
use crate::utils::errors::Result;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// The three shared-store parts as one handle
#[derive(Default)]
pub struct Storage {
    pub db: Database,
    pub env: EnvCache,
    pub pubsub: PubSub,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One buffered store mutation
#[derive(Debug, Clone)]
pub enum BulkOp {
    Insert {
        collection: String,
        document: Value,
    },
    Update {
        collection: String,
        query: Value,
        update: Value,
    },
}

/// Data-access facade used by the tick pipeline and the world helpers
pub struct Driver {
    storage: Arc<Storage>,
    queues: Arc<QueueService>,
    bulk: Mutex<Vec<BulkOp>>,
}

impl Driver {
    pub fn new(storage: Arc<Storage>, queues: Arc<QueueService>) -> Self {
        Self {
            storage,
            queues,
            bulk: Mutex::new(Vec::new()),
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn queues(&self) -> &Arc<QueueService> {
        &self.queues
    }

    /// Announce the beginning of a tick on the pub/sub channel.
    pub async fn notify_tick_started(&self) -> Result<()> {
        let time = self.game_time().await?;
        self.storage
            .pubsub
            .publish(channels::TICK_STARTED, time.to_string());
        Ok(())
    }

    /// Ids of every active user
    pub async fn get_all_users(&self) -> Result<Vec<String>> {
        let users = self.storage.db.collection("users").find(&json!({}));
        Ok(users
            .iter()
            .filter(|u| u.get("active").and_then(Value::as_f64).unwrap_or(0.0) > 0.0)
            .filter_map(|u| u.get("_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Ids of every active room
    pub async fn get_all_rooms(&self) -> Result<Vec<String>> {
        let rooms = self.storage.db.collection("rooms").find(&json!({ "active": true }));
        Ok(rooms
            .iter()
            .filter_map(|r| r.get("_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Buffer a mutation for the next commit stage.
    pub fn queue_bulk(&self, op: BulkOp) {
        self.bulk.lock().push(op);
    }

    /// Flush the write-behind buffer so later stages observe a consistent
    /// snapshot. Returns the number of mutations applied.
    pub async fn commit_bulk(&self) -> Result<usize> {
        let ops = std::mem::take(&mut *self.bulk.lock());
        let applied = ops.len();
        for op in ops {
            match op {
                BulkOp::Insert {
                    collection,
                    document,
                } => {
                    self.storage.db.collection(&collection).insert(document)?;
                }
                BulkOp::Update {
                    collection,
                    query,
                    update,
                } => {
                    self.storage.db.collection(&collection).update(&query, &update);
                }
            }
        }
        if applied > 0 {
            debug!(applied, "committed bulk mutations");
        }
        Ok(applied)
    }

    /// Current game time; unset reads as zero.
    pub async fn game_time(&self) -> Result<u64> {
        Ok(self.storage.env.get_u64(keys::GAME_TIME).unwrap_or(0))
    }

    /// Atomically advance the global tick counter and return the new value.
    pub async fn increment_game_time(&self) -> Result<u64> {
        Ok(self.storage.env.increment(keys::GAME_TIME))
    }

    /// Recompute the reachable-rooms cache from room statuses.
    pub async fn update_accessible_rooms_list(&self) -> Result<()> {
        let rooms = self.storage.db.collection("rooms").find(&json!({}));
        let accessible: Vec<&str> = rooms
            .iter()
            .filter(|r| {
                r.get("status").and_then(Value::as_str).unwrap_or("normal") != "out of borders"
            })
            .filter_map(|r| r.get("_id").and_then(Value::as_str))
            .collect();
        self.storage
            .env
            .set(keys::ACCESSIBLE_ROOMS, serde_json::to_string(&accessible)?);
        Ok(())
    }

    /// Recompute the per-room status cache.
    pub async fn update_room_status_data(&self) -> Result<()> {
        let rooms = self.storage.db.collection("rooms").find(&json!({}));
        let statuses: serde_json::Map<String, Value> = rooms
            .iter()
            .filter_map(|r| {
                let id = r.get("_id").and_then(Value::as_str)?;
                let status = r.get("status").cloned().unwrap_or(json!("normal"));
                Some((id.to_string(), status))
            })
            .collect();
        self.storage
            .env
            .set(keys::ROOM_STATUS_DATA, serde_json::to_string(&statuses)?);
        Ok(())
    }

    /// Announce that per-room processing for the given tick is complete.
    pub async fn notify_rooms_done(&self, game_time: u64) -> Result<()> {
        self.storage
            .pubsub
            .publish(channels::ROOMS_DONE, game_time.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> Driver {
        Driver::new(Arc::new(Storage::new()), Arc::new(QueueService::new()))
    }

    #[tokio::test]
    async fn test_active_users_filtered() {
        let driver = driver();
        let users = driver.storage().db.collection("users");
        users
            .insert(json!({ "_id": "2", "username": "Invader", "active": 0 }))
            .unwrap();
        users
            .insert(json!({ "_id": "u1", "username": "alice", "active": 10000 }))
            .unwrap();
        assert_eq!(driver.get_all_users().await.unwrap(), vec!["u1"]);
    }

    #[tokio::test]
    async fn test_active_rooms_filtered() {
        let driver = driver();
        let rooms = driver.storage().db.collection("rooms");
        rooms
            .insert(json!({ "_id": "W0N0", "status": "normal", "active": true }))
            .unwrap();
        rooms
            .insert(json!({ "_id": "W1N0", "status": "normal", "active": false }))
            .unwrap();
        assert_eq!(driver.get_all_rooms().await.unwrap(), vec!["W0N0"]);
    }

    #[tokio::test]
    async fn test_bulk_buffer_applies_on_commit_only() {
        let driver = driver();
        let rooms = driver.storage().db.collection("rooms");
        rooms
            .insert(json!({ "_id": "W0N0", "active": false }))
            .unwrap();

        driver.queue_bulk(BulkOp::Update {
            collection: "rooms".to_string(),
            query: json!({ "_id": "W0N0" }),
            update: json!({ "$set": { "active": true } }),
        });

        let before = rooms.find_one(&json!({ "_id": "W0N0" })).unwrap();
        assert_eq!(before.get("active"), Some(&json!(false)));

        assert_eq!(driver.commit_bulk().await.unwrap(), 1);
        let after = rooms.find_one(&json!({ "_id": "W0N0" })).unwrap();
        assert_eq!(after.get("active"), Some(&json!(true)));

        // Buffer drained
        assert_eq!(driver.commit_bulk().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_increment_game_time() {
        let driver = driver();
        assert_eq!(driver.increment_game_time().await.unwrap(), 1);
        assert_eq!(driver.increment_game_time().await.unwrap(), 2);
        assert_eq!(driver.game_time().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_accessible_rooms_excludes_out_of_borders() {
        let driver = driver();
        let rooms = driver.storage().db.collection("rooms");
        rooms
            .insert(json!({ "_id": "W0N0", "status": "normal" }))
            .unwrap();
        rooms
            .insert(json!({ "_id": "W9N9", "status": "out of borders" }))
            .unwrap();
        driver.update_accessible_rooms_list().await.unwrap();
        let cached = driver.storage().env.get(keys::ACCESSIBLE_ROOMS).unwrap();
        let list: Vec<String> = serde_json::from_str(&cached).unwrap();
        assert_eq!(list, vec!["W0N0"]);
    }
}
