use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{Collection, StorageGateway};
use crate::models::error::StorageError;

/// In-process document store used by tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<Collection, BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .get(&collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl StorageGateway for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError> {
        Ok(self
            .collections
            .get(&collection)
            .and_then(|c| c.get(id).cloned()))
    }

    async fn list_all(&self, collection: Collection) -> Result<Vec<Value>, StorageError> {
        Ok(self
            .collections
            .get(&collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StorageError> {
        Ok(self
            .collections
            .get(&collection)
            .map(|c| {
                c.values()
                    .filter(|doc| doc.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save(&self, collection: Collection, id: &str, doc: Value) -> Result<(), StorageError> {
        self.collections
            .entry(collection)
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn save_all(
        &self,
        collection: Collection,
        docs: Vec<(String, Value)>,
    ) -> Result<(), StorageError> {
        let mut entry = self.collections.entry(collection).or_default();
        for (id, doc) in docs {
            entry.insert(id, doc);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError> {
        if let Some(mut c) = self.collections.get_mut(&collection) {
            c.remove(id);
        }
        Ok(())
    }

    async fn delete_all(&self, collection: Collection) -> Result<(), StorageError> {
        self.collections.remove(&collection);
        Ok(())
    }
}
