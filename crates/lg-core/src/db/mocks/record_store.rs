//! Mock implementation of RecordStore for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::db::store::ID_FIELD;
use crate::db::{DbError, RecordStore};
use crate::scope::{ScopedQuery, ScopedWrite};

/// In-memory document store: collection → id → document.
///
/// Documents within a collection are kept in id order, so fetches are
/// deterministic.
#[derive(Default)]
pub struct MockRecordStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a raw document, bypassing the middleware.
    ///
    /// For fixtures only. The document must carry an `id`.
    pub async fn seed(&self, collection: &str, document: Value) {
        let id = document
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id, document);
    }

    /// Reads a raw document, bypassing the middleware.
    pub async fn document(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Every document in a collection, in id order.
    pub async fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn fetch(&self, query: &ScopedQuery) -> Result<Vec<Value>, DbError> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(query.collection()) else {
            return Ok(Vec::new());
        };

        let matching = documents.values().filter(|doc| query.matches(doc)).cloned();
        Ok(match query.limit() {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, DbError> {
        Ok(self.document(collection, id).await)
    }

    async fn put(&self, write: &ScopedWrite) -> Result<String, DbError> {
        self.collections
            .write()
            .await
            .entry(write.collection().to_string())
            .or_default()
            .insert(write.id().to_string(), write.payload().clone());
        Ok(write.id().to_string())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, DbError> {
        Ok(self
            .collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }
}
