// src/world/user.rs
//! Per-user handle
//!
//! Read access to a user's document fields, memory and memory segments,
//! console command injection, notification tracking, and a console event
//! stream fed by the store's pub/sub channel.

use crate::store::env::keys;
use crate::store::pubsub::channels;
use crate::store::{Document, Driver};
use crate::utils::errors::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

const CONSOLE_CHANNEL_CAPACITY: usize = 64;

/// One console flush from the user's script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEvent {
    pub log: Vec<String>,
    pub results: Vec<String>,
    pub user_id: String,
    pub username: String,
}

/// One stored user notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub kind: String,
    pub date: i64,
    pub count: u64,
}

// Wire shape of a console pub/sub payload
#[derive(Debug, Default, Deserialize)]
struct ConsolePayload {
    #[serde(default)]
    messages: ConsoleMessages,
}

#[derive(Debug, Default, Deserialize)]
struct ConsoleMessages {
    #[serde(default)]
    log: Vec<String>,
    #[serde(default)]
    results: Vec<String>,
}

/// Handle to one user of the world
pub struct User {
    driver: Arc<Driver>,
    id: String,
    username: String,
    known_notifications: Mutex<Vec<String>>,
    console_tx: broadcast::Sender<ConsoleEvent>,
    forward_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl User {
    pub fn new(driver: Arc<Driver>, id: String, username: String) -> Self {
        Self {
            driver,
            id,
            username,
            known_notifications: Mutex::new(Vec::new()),
            console_tx: broadcast::channel(CONSOLE_CHANNEL_CAPACITY).0,
            forward_task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// One field of the user's document
    pub async fn data(&self, field: &str) -> Result<Option<Value>> {
        Ok(self
            .driver
            .storage()
            .db
            .collection("users")
            .find_one(&json!({ "_id": self.id.as_str() }))
            .and_then(|doc| doc.get(field).cloned()))
    }

    pub async fn cpu(&self) -> Result<Option<f64>> {
        Ok(self.data("cpu").await?.and_then(|v| v.as_f64()))
    }

    pub async fn cpu_available(&self) -> Result<Option<f64>> {
        Ok(self.data("cpuAvailable").await?.and_then(|v| v.as_f64()))
    }

    pub async fn gcl(&self) -> Result<Option<f64>> {
        Ok(self.data("gcl").await?.and_then(|v| v.as_f64()))
    }

    pub async fn last_used_cpu(&self) -> Result<Option<f64>> {
        Ok(self.data("lastUsedCpu").await?.and_then(|v| v.as_f64()))
    }

    pub async fn rooms(&self) -> Result<Option<Value>> {
        self.data("rooms").await
    }

    /// The user's memory blob
    pub async fn memory(&self) -> Result<Option<String>> {
        Ok(self
            .driver
            .storage()
            .env
            .get(&format!("{}{}", keys::MEMORY, self.id)))
    }

    /// Contents of the requested memory segments, in request order
    pub async fn segments(&self, list: &[u32]) -> Result<Vec<Option<String>>> {
        let fields: Vec<String> = list.iter().map(u32::to_string).collect();
        Ok(self
            .driver
            .storage()
            .env
            .hmget(&format!("{}{}", keys::MEMORY_SEGMENTS, self.id), &fields))
    }

    /// Queue a console command to run next tick
    pub async fn console(&self, expression: &str) -> Result<Document> {
        self.driver.storage().db.collection("users.console").insert(json!({
            "user": self.id.as_str(),
            "expression": expression,
            "hidden": false,
        }))
    }

    /// All stored notifications; every listed id becomes known.
    pub async fn notifications(&self) -> Result<Vec<Notification>> {
        let docs = self
            .driver
            .storage()
            .db
            .collection("users.notifications")
            .find(&json!({ "user": self.id.as_str() }));
        let mut known = self.known_notifications.lock();
        Ok(docs
            .iter()
            .map(|doc| {
                let notification = parse_notification(doc);
                if !known.contains(&notification.id) {
                    known.push(notification.id.clone());
                }
                notification
            })
            .collect())
    }

    /// Notifications not seen by a previous `notifications` call
    pub async fn new_notifications(&self) -> Result<Vec<Notification>> {
        let known = self.known_notifications.lock().clone();
        let all = self.notifications().await?;
        Ok(all
            .into_iter()
            .filter(|n| !known.contains(&n.id))
            .collect())
    }

    /// Subscribe to the user's console channel and forward parsed events.
    pub async fn init(self) -> Result<Self> {
        let channel = channels::user_console(&self.id);
        let mut rx = self.driver.storage().pubsub.subscribe(&channel);
        let tx = self.console_tx.clone();
        let user_id = self.id.clone();
        let username = self.username.clone();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(raw) => {
                        let payload: ConsolePayload = match serde_json::from_str(&raw) {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!(user = %user_id, "ignoring malformed console payload: {e}");
                                continue;
                            }
                        };
                        let _ = tx.send(ConsoleEvent {
                            log: payload.messages.log,
                            results: payload.messages.results,
                            user_id: user_id.clone(),
                            username: username.clone(),
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(user = %user_id, skipped, "console subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *self.forward_task.lock() = Some(task);
        Ok(self)
    }

    /// Receiver of parsed console events (requires `init`)
    pub fn console_events(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.console_tx.subscribe()
    }
}

impl Drop for User {
    fn drop(&mut self) {
        if let Some(task) = self.forward_task.lock().take() {
            task.abort();
        }
    }
}

fn parse_notification(doc: &Document) -> Notification {
    Notification {
        id: doc
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        message: doc
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        kind: doc
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        date: doc.get("date").and_then(Value::as_i64).unwrap_or_default(),
        count: doc.get("count").and_then(Value::as_u64).unwrap_or(1),
    }
}
