// src/world/world.rs
//! World manipulation facade
//!
//! Room, terrain and object management over the driver, plus the bot
//! bootstrap flow. These helpers run outside the tick loop; the tick
//! pipeline only ever sees their effects through the store.

use crate::store::env::keys;
use crate::store::{Document, Driver};
use crate::utils::errors::{Result, ServerError};
use crate::world::constants;
use crate::world::terrain::{TerrainKind, TerrainMatrix, ROOM_SIZE};
use crate::world::user::User;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

// Terrain string for a room completely filled with walls
static WALLED: Lazy<String> = Lazy::new(|| "1".repeat(2500));

const ZSTD_LEVEL: i32 = 3;

/// Options for [`World::add_bot`]
#[derive(Debug, Clone)]
pub struct AddBotOptions {
    pub username: String,
    pub room: String,
    pub x: u32,
    pub y: u32,
    pub gcl: u64,
    pub cpu: u64,
    pub cpu_available: u64,
    pub active: u64,
    pub spawn_name: String,
    pub modules: Value,
}

impl AddBotOptions {
    pub fn new(username: &str, room: &str, x: u32, y: u32) -> Self {
        Self {
            username: username.to_string(),
            room: room.to_string(),
            x,
            y,
            gcl: 1,
            cpu: 100,
            cpu_available: 10_000,
            active: 10_000,
            spawn_name: "Spawn1".to_string(),
            modules: json!({}),
        }
    }
}

/// World-state helper over the shared store
#[derive(Clone)]
pub struct World {
    driver: Arc<Driver>,
}

impl World {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }

    /// Current game time
    pub async fn game_time(&self) -> Result<u64> {
        self.driver.game_time().await
    }

    /// Set a room's status, creating the room if needed.
    ///
    /// Does not generate terrain data.
    pub async fn set_room(&self, room: &str, status: &str, active: bool) -> Result<()> {
        let rooms = self.driver.storage().db.collection("rooms");
        let query = json!({ "_id": room });
        if rooms.find_one(&query).is_some() {
            rooms.update(&query, &json!({ "$set": { "status": status, "active": active } }));
        } else {
            rooms.insert(json!({ "_id": room, "status": status, "active": active }))?;
        }
        self.driver.update_accessible_rooms_list().await
    }

    /// Add a room with default status
    pub async fn add_room(&self, room: &str) -> Result<()> {
        self.set_room(room, "normal", true).await
    }

    /// A room's terrain as a [`TerrainMatrix`]
    pub async fn get_terrain(&self, room: &str) -> Result<TerrainMatrix> {
        let terrain = self.driver.storage().db.collection("rooms.terrain");
        let doc = terrain
            .find_one(&json!({ "room": room }))
            .ok_or_else(|| ServerError::MissingTerrain(room.to_string()))?;
        let serial = doc
            .get("terrain")
            .and_then(Value::as_str)
            .ok_or_else(|| ServerError::MissingTerrain(room.to_string()))?;
        TerrainMatrix::unserialize(serial)
    }

    /// Store a room's terrain and refresh the compressed terrain cache
    pub async fn set_terrain(&self, room: &str, matrix: &TerrainMatrix) -> Result<()> {
        let terrain = self.driver.storage().db.collection("rooms.terrain");
        let query = json!({ "room": room });
        let serial = matrix.serialize();
        if terrain.find_one(&query).is_some() {
            terrain.update(&query, &json!({ "$set": { "terrain": serial } }));
        } else {
            terrain.insert(json!({ "room": room, "terrain": serial }))?;
        }
        self.update_env_terrain().await
    }

    /// Insert a room object at validated coordinates
    pub async fn add_room_object(
        &self,
        room: &str,
        object_type: &str,
        x: u32,
        y: u32,
        attributes: Value,
    ) -> Result<Document> {
        if x >= ROOM_SIZE || y >= ROOM_SIZE {
            return Err(ServerError::InvalidCoordinates {
                x: x as i64,
                y: y as i64,
            });
        }
        let mut object = serde_json::Map::new();
        object.insert("room".to_string(), json!(room));
        object.insert("x".to_string(), json!(x));
        object.insert("y".to_string(), json!(y));
        object.insert("type".to_string(), json!(object_type));
        if let Value::Object(attributes) = attributes {
            for (key, value) in attributes {
                object.insert(key, value);
            }
        }
        self.driver
            .storage()
            .db
            .collection("rooms.objects")
            .insert(Value::Object(object))
    }

    /// Reset to a barren world holding only the two built-in system users
    pub async fn reset(&self) -> Result<()> {
        let storage = self.driver.storage();
        storage.db.clear_all();
        storage.env.clear();
        storage.env.set(keys::GAME_TIME, "1");

        let users = storage.db.collection("users");
        users.insert(json!({
            "_id": "2", "username": "Invader",
            "cpu": 100, "cpuAvailable": 10_000, "gcl": 13_966_610.2, "active": 0
        }))?;
        users.insert(json!({
            "_id": "3", "username": "Source Keeper",
            "cpu": 100, "cpuAvailable": 10_000, "gcl": 13_966_610.2, "active": 0
        }))?;
        debug!("world reset");
        Ok(())
    }

    /// Stub a deterministic 3×3 world with terrain, sources, minerals and
    /// controllers in every room.
    pub async fn stub_world(&self) -> Result<()> {
        self.reset().await?;
        for ny in 0..3 {
            for wx in 0..3 {
                let room = format!("W{wx}N{ny}");
                self.add_room(&room).await?;
                self.set_terrain(&room, &stub_terrain()?).await?;
                self.add_room_object(
                    &room,
                    "source",
                    10,
                    10,
                    json!({ "energy": 3000, "energyCapacity": 3000, "ticksToRegeneration": 300 }),
                )
                .await?;
                self.add_room_object(
                    &room,
                    "source",
                    40,
                    40,
                    json!({ "energy": 3000, "energyCapacity": 3000, "ticksToRegeneration": 300 }),
                )
                .await?;
                self.add_room_object(
                    &room,
                    "mineral",
                    25,
                    40,
                    json!({ "mineralType": "H", "density": 3, "mineralAmount": 3000 }),
                )
                .await?;
                self.add_room_object(&room, "controller", 25, 25, json!({ "level": 0 }))
                    .await?;
            }
        }
        Ok(())
    }

    /// All objects of one room
    pub async fn room_objects(&self, room: &str) -> Result<Vec<Document>> {
        Ok(self
            .driver
            .storage()
            .db
            .collection("rooms.objects")
            .find(&json!({ "room": room })))
    }

    /// Add a playing user with its spawn and claimed controller.
    ///
    /// Fails when the target room has no controller. Returns an initialized
    /// [`User`] handle subscribed to the user's console channel.
    pub async fn add_bot(&self, opts: AddBotOptions) -> Result<User> {
        let storage = self.driver.storage();
        let objects = storage.db.collection("rooms.objects");
        let controller_query =
            json!({ "$and": [{ "room": opts.room.as_str() }, { "type": "controller" }] });
        if objects.find_one(&controller_query).is_none() {
            return Err(ServerError::RoomWithoutController(opts.room));
        }

        let user = storage.db.collection("users").insert(json!({
            "username": opts.username.as_str(),
            "cpu": opts.cpu,
            "cpuAvailable": opts.cpu_available,
            "gcl": opts.gcl,
            "active": opts.active,
        }))?;
        let user_id = user
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ServerError::Storage("user insert lost its id".to_string()))?
            .to_string();

        storage
            .env
            .set(&format!("{}{user_id}", keys::MEMORY), "{}");
        storage.db.collection("rooms").update(
            &json!({ "_id": opts.room.as_str() }),
            &json!({ "$set": { "active": true } }),
        );
        storage.db.collection("users.code").insert(json!({
            "user": user_id.as_str(),
            "branch": "default",
            "modules": opts.modules,
            "activeWorld": true,
        }))?;
        objects.update(
            &controller_query,
            &json!({ "$set": {
                "user": user_id.as_str(),
                "level": 1,
                "progress": 0,
                "downgradeTime": null,
                "safeMode": constants::CONTROLLER_SAFE_MODE,
            } }),
        );
        objects.insert(json!({
            "room": opts.room,
            "x": opts.x,
            "y": opts.y,
            "type": "spawn",
            "user": user_id.as_str(),
            "name": opts.spawn_name,
            "store": { "energy": constants::SPAWN_ENERGY_START },
            "storeCapacityResource": { "energy": constants::SPAWN_ENERGY_CAPACITY },
            "hits": constants::SPAWN_HITS,
            "hitsMax": constants::SPAWN_HITS,
            "spawning": null,
            "notifyWhenAttacked": true,
        }))?;

        User::new(Arc::clone(&self.driver), user_id, opts.username)
            .init()
            .await
    }

    /// Recompute the compressed all-rooms terrain cache.
    ///
    /// Out-of-borders rooms are replaced by full walls, and missing
    /// horizontal/vertical neighbor rooms are padded as walled so clients
    /// can always index adjacent terrain.
    async fn update_env_terrain(&self) -> Result<()> {
        let storage = self.driver.storage();
        let rooms = storage.db.collection("rooms").find(&json!({}));
        let mut terrain = storage.db.collection("rooms.terrain").find(&json!({}));

        for room in &rooms {
            let Some(id) = room.get("_id").and_then(Value::as_str) else {
                continue;
            };
            if room.get("status").and_then(Value::as_str) == Some("out of borders") {
                if let Some(doc) = terrain
                    .iter_mut()
                    .find(|t| t.get("room").and_then(Value::as_str) == Some(id))
                {
                    doc.insert("terrain".to_string(), json!(WALLED.as_str()));
                }
            }
            let (horizontal, vertical) = neighbor_rooms(id)?;
            for neighbor in [horizontal, vertical] {
                let present = terrain
                    .iter()
                    .any(|t| t.get("room").and_then(Value::as_str) == Some(neighbor.as_str()));
                if !present {
                    let mut doc = Document::new();
                    doc.insert("room".to_string(), json!(neighbor));
                    doc.insert("terrain".to_string(), json!(WALLED.as_str()));
                    terrain.push(doc);
                }
            }
        }

        let raw = serde_json::to_vec(&terrain)?;
        let compressed = zstd::encode_all(raw.as_slice(), ZSTD_LEVEL)
            .map_err(|e| ServerError::Compression(e.to_string()))?;
        storage
            .env
            .set(keys::TERRAIN_DATA, BASE64.encode(compressed));
        Ok(())
    }
}

/// Build the deterministic stub-room terrain: walled border, a swamp patch,
/// plains everywhere else.
fn stub_terrain() -> Result<TerrainMatrix> {
    let mut matrix = TerrainMatrix::new();
    for i in 0..ROOM_SIZE {
        matrix.set(i, 0, TerrainKind::Wall)?;
        matrix.set(i, ROOM_SIZE - 1, TerrainKind::Wall)?;
        matrix.set(0, i, TerrainKind::Wall)?;
        matrix.set(ROOM_SIZE - 1, i, TerrainKind::Wall)?;
    }
    for x in 20..30 {
        for y in 5..10 {
            matrix.set(x, y, TerrainKind::Swamp)?;
        }
    }
    Ok(matrix)
}

/// Room-name geometry: `W5N8` → the adjacent rooms one step along each axis.
fn neighbor_rooms(name: &str) -> Result<(String, String)> {
    let (h, x, v, y) = parse_room_name(name)?;
    Ok((
        format!("{h}{}{v}{y}", x + 1),
        format!("{h}{x}{v}{}", y + 1),
    ))
}

fn parse_room_name(name: &str) -> Result<(char, u32, char, u32)> {
    let invalid = || ServerError::InvalidRoomName(name.to_string());
    let mut chars = name.chars();
    let h = chars
        .next()
        .filter(|c| matches!(*c, 'W' | 'E'))
        .ok_or_else(invalid)?;
    let rest = &name[1..];
    let split = rest.find(['N', 'S']).ok_or_else(invalid)?;
    let x: u32 = rest[..split].parse().map_err(|_| invalid())?;
    let v = rest[split..].chars().next().ok_or_else(invalid)?;
    let y: u32 = rest[split + 1..].parse().map_err(|_| invalid())?;
    Ok((h, x, v, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueService;
    use crate::store::Storage;

    fn world() -> World {
        World::new(Arc::new(Driver::new(
            Arc::new(Storage::new()),
            Arc::new(QueueService::new()),
        )))
    }

    #[test]
    fn test_parse_room_name() {
        assert_eq!(parse_room_name("W5N8").unwrap(), ('W', 5, 'N', 8));
        assert_eq!(parse_room_name("E0S12").unwrap(), ('E', 0, 'S', 12));
        assert!(parse_room_name("X5N8").is_err());
        assert!(parse_room_name("W5").is_err());
        assert!(parse_room_name("WN8").is_err());
    }

    #[test]
    fn test_neighbor_rooms() {
        let (h, v) = neighbor_rooms("W5N8").unwrap();
        assert_eq!(h, "W6N8");
        assert_eq!(v, "W5N9");
    }

    #[tokio::test]
    async fn test_set_room_creates_then_updates() {
        let world = world();
        world.add_room("W0N0").await.unwrap();
        let rooms = world.driver.storage().db.collection("rooms");
        let room = rooms.find_one(&json!({ "_id": "W0N0" })).unwrap();
        assert_eq!(room.get("status"), Some(&json!("normal")));

        world.set_room("W0N0", "out of borders", false).await.unwrap();
        assert_eq!(rooms.len(), 1);
        let room = rooms.find_one(&json!({ "_id": "W0N0" })).unwrap();
        assert_eq!(room.get("status"), Some(&json!("out of borders")));
    }

    #[tokio::test]
    async fn test_terrain_storage_round_trip() {
        let world = world();
        world.add_room("W1N1").await.unwrap();
        let mut matrix = TerrainMatrix::new();
        matrix.set(7, 9, TerrainKind::Wall).unwrap();
        matrix.set(30, 2, TerrainKind::Swamp).unwrap();
        world.set_terrain("W1N1", &matrix).await.unwrap();

        let loaded = world.get_terrain("W1N1").await.unwrap();
        assert_eq!(loaded, matrix);
    }

    #[tokio::test]
    async fn test_get_terrain_missing_room() {
        let world = world();
        assert!(matches!(
            world.get_terrain("W9N9").await,
            Err(ServerError::MissingTerrain(_))
        ));
    }

    #[tokio::test]
    async fn test_env_terrain_cache_pads_neighbors() {
        let world = world();
        world.add_room("W1N1").await.unwrap();
        world
            .set_terrain("W1N1", &TerrainMatrix::new())
            .await
            .unwrap();

        let cached = world
            .driver
            .storage()
            .env
            .get(keys::TERRAIN_DATA)
            .expect("terrain cache should be set");
        let compressed = BASE64.decode(cached).unwrap();
        let raw = zstd::decode_all(compressed.as_slice()).unwrap();
        let docs: Vec<Document> = serde_json::from_slice(&raw).unwrap();

        let room_of = |d: &Document| d.get("room").and_then(Value::as_str).map(str::to_string);
        let names: Vec<String> = docs.iter().filter_map(room_of).collect();
        assert!(names.contains(&"W1N1".to_string()));
        // Padded neighbors are fully walled.
        for neighbor in ["W2N1", "W1N2"] {
            let doc = docs
                .iter()
                .find(|d| d.get("room") == Some(&json!(neighbor)))
                .unwrap_or_else(|| panic!("{neighbor} missing from terrain cache"));
            assert_eq!(doc.get("terrain"), Some(&json!(WALLED.as_str())));
        }
    }

    #[tokio::test]
    async fn test_add_room_object_validates_coordinates() {
        let world = world();
        assert!(matches!(
            world.add_room_object("W0N0", "source", 50, 0, json!({})).await,
            Err(ServerError::InvalidCoordinates { .. })
        ));
        assert!(world
            .add_room_object("W0N0", "source", 49, 49, json!({ "energy": 3000 }))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_reset_seeds_system_users() {
        let world = world();
        world.add_room("W0N0").await.unwrap();
        world.reset().await.unwrap();

        assert_eq!(world.game_time().await.unwrap(), 1);
        let db = &world.driver.storage().db;
        assert!(db.collection("rooms").is_empty());
        let users = db.collection("users");
        assert_eq!(users.len(), 2);
        assert!(users.find_one(&json!({ "username": "Invader" })).is_some());
        assert!(users
            .find_one(&json!({ "username": "Source Keeper" }))
            .is_some());
    }

    #[tokio::test]
    async fn test_stub_world_shape() {
        let world = world();
        world.stub_world().await.unwrap();

        let db = &world.driver.storage().db;
        assert_eq!(db.collection("rooms").len(), 9);
        assert_eq!(db.collection("rooms.terrain").len(), 9);
        for room in ["W0N0", "W2N2"] {
            let objects = world.room_objects(room).await.unwrap();
            assert_eq!(objects.len(), 4);
            assert!(objects
                .iter()
                .any(|o| o.get("type") == Some(&json!("controller"))));
        }
        // Stub terrain is deterministic and walled at the border.
        let terrain = world.get_terrain("W1N1").await.unwrap();
        assert_eq!(terrain.get(0, 0), TerrainKind::Wall);
        assert_eq!(terrain.get(25, 7), TerrainKind::Swamp);
        assert_eq!(terrain.get(25, 25), TerrainKind::Plain);
    }

    #[tokio::test]
    async fn test_add_bot_requires_controller() {
        let world = world();
        world.add_room("W0N0").await.unwrap();
        let err = world
            .add_bot(AddBotOptions::new("alice", "W0N0", 20, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::RoomWithoutController(_)));
    }

    #[tokio::test]
    async fn test_add_bot_bootstraps_user() {
        let world = world();
        world.stub_world().await.unwrap();
        let user = world
            .add_bot(AddBotOptions::new("alice", "W0N0", 20, 20))
            .await
            .unwrap();

        assert_eq!(user.username(), "alice");
        let storage = world.driver.storage();
        assert_eq!(
            storage.env.get(&format!("{}{}", keys::MEMORY, user.id())),
            Some("{}".to_string())
        );

        let objects = world.room_objects("W0N0").await.unwrap();
        let spawn = objects
            .iter()
            .find(|o| o.get("type") == Some(&json!("spawn")))
            .expect("spawn should exist");
        assert_eq!(spawn.get("user"), Some(&json!(user.id())));
        let controller = objects
            .iter()
            .find(|o| o.get("type") == Some(&json!("controller")))
            .unwrap();
        assert_eq!(controller.get("user"), Some(&json!(user.id())));
        assert_eq!(controller.get("level"), Some(&json!(1)));

        let code = storage
            .db
            .collection("users.code")
            .find_one(&json!({ "user": user.id() }))
            .unwrap();
        assert_eq!(code.get("branch"), Some(&json!("default")));
    }
}
