// src/store/database.rs
//! In-process document collections
//!
//! Collections hold JSON objects and support equality queries plus `$and`,
//! inserts with generated ids, and `$set` updates. This covers what the
//! coordinator and the world helpers actually ask of the store.

use crate::utils::errors::{Result, ServerError};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use ulid::Ulid;

/// A stored document: a JSON object
pub type Document = Map<String, Value>;

/// Named document collections
#[derive(Default)]
pub struct Database {
    collections: DashMap<String, Arc<Collection>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a collection by name
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Collection::new(name)))
            .clone()
    }

    /// Names of all collections that have been touched
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.iter().map(|e| e.key().clone()).collect()
    }

    /// Clear every collection
    pub fn clear_all(&self) {
        for entry in self.collections.iter() {
            entry.value().clear();
        }
    }
}

/// One document collection
pub struct Collection {
    name: String,
    docs: Mutex<Vec<Document>>,
}

impl Collection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            docs: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All documents matching the query
    pub fn find(&self, query: &Value) -> Vec<Document> {
        let docs = self.docs.lock();
        docs.iter().filter(|d| matches(d, query)).cloned().collect()
    }

    /// First document matching the query
    pub fn find_one(&self, query: &Value) -> Option<Document> {
        let docs = self.docs.lock();
        docs.iter().find(|d| matches(d, query)).cloned()
    }

    /// Insert a document, generating an `_id` when absent.
    ///
    /// Returns the stored document including its id.
    pub fn insert(&self, doc: Value) -> Result<Document> {
        let Value::Object(mut doc) = doc else {
            return Err(ServerError::Storage(format!(
                "collection `{}` only stores objects",
                self.name
            )));
        };
        doc.entry("_id".to_string())
            .or_insert_with(|| Value::String(Ulid::new().to_string()));
        self.docs.lock().push(doc.clone());
        Ok(doc)
    }

    /// Apply a `{"$set": {...}}` update to every matching document.
    ///
    /// Returns the number of documents updated.
    pub fn update(&self, query: &Value, update: &Value) -> usize {
        let set = update
            .get("$set")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut updated = 0;
        let mut docs = self.docs.lock();
        for doc in docs.iter_mut().filter(|d| matches(d, query)) {
            for (key, value) in &set {
                doc.insert(key.clone(), value.clone());
            }
            updated += 1;
        }
        updated
    }

    /// Remove every document
    pub fn clear(&self) {
        self.docs.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }
}

/// Equality matching over document fields, with `$and` conjunction.
fn matches(doc: &Document, query: &Value) -> bool {
    let Some(query) = query.as_object() else {
        return false;
    };
    query.iter().all(|(key, expected)| {
        if key == "$and" {
            expected
                .as_array()
                .is_some_and(|qs| qs.iter().all(|q| matches(doc, q)))
        } else {
            doc.get(key) == Some(expected)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_generates_id() {
        let db = Database::new();
        let users = db.collection("users");
        let doc = users.insert(json!({ "username": "alice" })).unwrap();
        assert!(doc.get("_id").unwrap().is_string());
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn test_insert_keeps_explicit_id() {
        let db = Database::new();
        let users = db.collection("users");
        let doc = users.insert(json!({ "_id": "2", "username": "Invader" })).unwrap();
        assert_eq!(doc.get("_id"), Some(&json!("2")));
    }

    #[test]
    fn test_insert_rejects_non_object() {
        let db = Database::new();
        let users = db.collection("users");
        assert!(users.insert(json!("nope")).is_err());
    }

    #[test]
    fn test_find_equality_and_conjunction() {
        let db = Database::new();
        let objects = db.collection("rooms.objects");
        objects
            .insert(json!({ "room": "W0N0", "type": "controller" }))
            .unwrap();
        objects
            .insert(json!({ "room": "W0N0", "type": "source" }))
            .unwrap();
        objects
            .insert(json!({ "room": "W1N0", "type": "controller" }))
            .unwrap();

        assert_eq!(objects.find(&json!({ "room": "W0N0" })).len(), 2);
        let controller = objects
            .find_one(&json!({ "$and": [{ "room": "W0N0" }, { "type": "controller" }] }))
            .unwrap();
        assert_eq!(controller.get("type"), Some(&json!("controller")));
    }

    #[test]
    fn test_update_set() {
        let db = Database::new();
        let rooms = db.collection("rooms");
        rooms
            .insert(json!({ "_id": "W0N0", "status": "normal", "active": false }))
            .unwrap();
        let n = rooms.update(
            &json!({ "_id": "W0N0" }),
            &json!({ "$set": { "active": true } }),
        );
        assert_eq!(n, 1);
        let room = rooms.find_one(&json!({ "_id": "W0N0" })).unwrap();
        assert_eq!(room.get("active"), Some(&json!(true)));
        assert_eq!(room.get("status"), Some(&json!("normal")));
    }

    #[test]
    fn test_clear_all() {
        let db = Database::new();
        db.collection("users").insert(json!({ "u": 1 })).unwrap();
        db.collection("rooms").insert(json!({ "r": 1 })).unwrap();
        db.clear_all();
        assert!(db.collection("users").is_empty());
        assert!(db.collection("rooms").is_empty());
    }
}
