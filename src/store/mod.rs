//! In-memory document store used to seed device identities
//!
//! Documents are JSON objects grouped into named collections. The store is a
//! lookup/insert collection only: nothing is written to disk.

mod query;

pub use query::{Condition, Query};

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::Result;
use crate::ven::VenProps;

/// Collection holding persisted device identities
pub const VEN_COLLECTION: &str = "ven_props";

/// Named collections of JSON documents
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    collections: BTreeMap<String, Vec<Value>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate `ven_props` with `count` generated identities
    pub fn seed(&mut self, count: usize) {
        self.create_collection(VEN_COLLECTION);
        for index in 0..count {
            let props = VenProps::generate(index);
            if let Err(e) = self.insert_record(VEN_COLLECTION, &props) {
                tracing::warn!(error = %e, index, "failed to seed VEN identity");
            }
        }
        tracing::debug!(count, "seeded VEN identities");
    }

    /// Create a collection if it does not exist yet
    pub fn create_collection(&mut self, name: &str) -> &mut Vec<Value> {
        self.collections.entry(name.to_string()).or_default()
    }

    /// Remove a collection and all of its documents
    pub fn drop_collection(&mut self, name: &str) {
        self.collections.remove(name);
    }

    /// Names of every collection
    #[must_use]
    pub fn list_collections(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    /// Append a document, creating the collection on first use
    pub fn insert(&mut self, collection: &str, document: Value) -> Value {
        self.create_collection(collection).push(document.clone());
        document
    }

    /// Serialize and append a typed record
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be serialized
    pub fn insert_record<T: Serialize>(&mut self, collection: &str, record: &T) -> Result<()> {
        let document = serde_json::to_value(record)?;
        self.insert(collection, document);
        Ok(())
    }

    /// All documents matching `query`, in insertion order
    #[must_use]
    pub fn find(&self, collection: &str, query: &Query) -> Vec<Value> {
        self.collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default()
    }

    /// First document matching `query`
    #[must_use]
    pub fn find_one(&self, collection: &str, query: &Query) -> Option<Value> {
        self.collections
            .get(collection)?
            .iter()
            .find(|d| query.matches(d))
            .cloned()
    }

    /// Matching documents deserialized into typed records
    ///
    /// # Errors
    ///
    /// Returns error if a matching document does not fit `T`
    pub fn find_records<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<T>> {
        self.find(collection, query)
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Into::into))
            .collect()
    }

    /// Merge `patch` into every matching document, returning how many changed
    pub fn update(&mut self, collection: &str, query: &Query, patch: &Value) -> usize {
        let Some(docs) = self.collections.get_mut(collection) else {
            return 0;
        };
        let Some(fields) = patch.as_object() else {
            return 0;
        };

        let mut updated = 0;
        for doc in docs.iter_mut().filter(|d| query.matches(d)) {
            if let Some(target) = doc.as_object_mut() {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
                updated += 1;
            }
        }
        updated
    }

    /// Remove every matching document, returning how many were removed
    pub fn delete(&mut self, collection: &str, query: &Query) -> usize {
        let Some(docs) = self.collections.get_mut(collection) else {
            return 0;
        };
        let before = docs.len();
        docs.retain(|d| !query.matches(d));
        before - docs.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn create_collection_is_idempotent() {
        let mut db = MemoryStore::new();
        db.insert("test_collection", json!({"id": 1}));
        db.create_collection("test_collection");
        assert_eq!(db.find("test_collection", &Query::all()).len(), 1);
    }

    #[test]
    fn insert_creates_collection() {
        let mut db = MemoryStore::new();
        db.insert("test_collection", json!({"id": 1, "name": "Test"}));
        assert_eq!(db.list_collections(), vec!["test_collection".to_string()]);
        assert_eq!(
            db.find("test_collection", &Query::all()),
            vec![json!({"id": 1, "name": "Test"})]
        );
    }

    #[test]
    fn find_with_query() {
        let mut db = MemoryStore::new();
        db.insert("test_collection", json!({"id": 1, "name": "Test"}));
        db.insert("test_collection", json!({"id": 2, "name": "Another Test"}));

        let result = db.find("test_collection", &Query::all().eq("id", 1));
        assert_eq!(result, vec![json!({"id": 1, "name": "Test"})]);
    }

    #[test]
    fn find_with_comparison() {
        let mut db = MemoryStore::new();
        db.insert("test_collection", json!({"id": 1, "value": 10}));
        db.insert("test_collection", json!({"id": 2, "value": 20}));

        let query = Query::all().with("value", Condition::Gt(json!(15)));
        assert_eq!(
            db.find("test_collection", &query),
            vec![json!({"id": 2, "value": 20})]
        );
    }

    #[test]
    fn find_unknown_collection_is_empty() {
        let db = MemoryStore::new();
        assert!(db.find("missing", &Query::all()).is_empty());
        assert!(db.find_one("missing", &Query::all()).is_none());
    }

    #[test]
    fn find_one_without_match_is_none() {
        let mut db = MemoryStore::new();
        db.insert("test_collection", json!({"id": 1}));
        assert!(db.find_one("test_collection", &Query::all().eq("id", 7)).is_none());
    }

    #[test]
    fn update_merges_fields() {
        let mut db = MemoryStore::new();
        db.insert("test_collection", json!({"id": 1, "name": "Test"}));

        let count = db.update(
            "test_collection",
            &Query::all().eq("id", 1),
            &json!({"name": "Updated Test"}),
        );
        assert_eq!(count, 1);
        assert_eq!(
            db.find("test_collection", &Query::all()),
            vec![json!({"id": 1, "name": "Updated Test"})]
        );
    }

    #[test]
    fn delete_removes_matches() {
        let mut db = MemoryStore::new();
        db.insert("test_collection", json!({"id": 1, "name": "Test"}));
        db.insert("test_collection", json!({"id": 2, "name": "Another Test"}));

        assert_eq!(db.delete("test_collection", &Query::all().eq("id", 1)), 1);
        assert_eq!(
            db.find("test_collection", &Query::all()),
            vec![json!({"id": 2, "name": "Another Test"})]
        );
    }

    #[test]
    fn drop_and_list_collections() {
        let mut db = MemoryStore::new();
        db.create_collection("collection1");
        db.create_collection("collection2");
        db.drop_collection("collection1");
        assert_eq!(db.list_collections(), vec!["collection2".to_string()]);
    }

    #[test]
    fn seed_round_trips_typed_records() {
        let mut db = MemoryStore::new();
        db.seed(3);

        let records: Vec<VenProps> = db.find_records(VEN_COLLECTION, &Query::all()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].id, "ID-2");
        assert_eq!(records[2].registration_id, "REG-2");

        let one: Vec<VenProps> = db
            .find_records(VEN_COLLECTION, &Query::all().eq("name", "ven-1"))
            .unwrap();
        assert_eq!(one[0].id, "ID-1");
    }
}
