//! Document-store gateway consumed by the pipeline.
//!
//! Each collection holds JSON documents keyed by id. A single upsert is atomic;
//! nothing spans keys.

pub mod memory;
pub mod supabase;

use std::fmt;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::models::error::StorageError;

pub use memory::MemoryStore;
pub use supabase::PostgrestStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Drivers,
    Constructors,
    Races,
    DriverStandings,
    ConstructorStandings,
}

impl Collection {
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Drivers => "Drivers",
            Collection::Constructors => "Constructors",
            Collection::Races => "Races",
            Collection::DriverStandings => "DriverStandings",
            Collection::ConstructorStandings => "ConstructorStandings",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError>;

    async fn list_all(&self, collection: Collection) -> Result<Vec<Value>, StorageError>;

    /// Documents whose top-level `field` equals `value`.
    async fn list_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StorageError>;

    async fn save(&self, collection: Collection, id: &str, doc: Value) -> Result<(), StorageError>;

    async fn save_all(
        &self,
        collection: Collection,
        docs: Vec<(String, Value)>,
    ) -> Result<(), StorageError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError>;

    async fn delete_all(&self, collection: Collection) -> Result<(), StorageError>;
}

/// A typed document living in one collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> String;
}

fn decode<T: Document>(value: Value) -> Result<T, StorageError> {
    serde_json::from_value(value).map_err(|e| StorageError::Decode {
        collection: T::COLLECTION.to_string(),
        reason: e.to_string(),
    })
}

fn encode<T: Document>(doc: &T) -> Result<Value, StorageError> {
    serde_json::to_value(doc).map_err(|e| StorageError::Encode {
        collection: T::COLLECTION.to_string(),
        reason: e.to_string(),
    })
}

/// Typed access on top of any [`StorageGateway`].
#[async_trait]
pub trait StorageExt {
    async fn fetch<T: Document>(&self, id: &str) -> Result<Option<T>, StorageError>;
    async fn fetch_all<T: Document>(&self) -> Result<Vec<T>, StorageError>;
    async fn fetch_by<T: Document>(&self, field: &str, value: Value) -> Result<Vec<T>, StorageError>;
    async fn store<T: Document>(&self, doc: &T) -> Result<(), StorageError>;
    async fn store_all<T: Document>(&self, docs: &[T]) -> Result<(), StorageError>;
    async fn remove<T: Document>(&self, id: &str) -> Result<(), StorageError>;
    async fn remove_all<T: Document>(&self) -> Result<(), StorageError>;
}

#[async_trait]
impl<S: StorageGateway + ?Sized> StorageExt for S {
    async fn fetch<T: Document>(&self, id: &str) -> Result<Option<T>, StorageError> {
        self.get(T::COLLECTION, id).await?.map(decode).transpose()
    }

    async fn fetch_all<T: Document>(&self) -> Result<Vec<T>, StorageError> {
        self.list_all(T::COLLECTION)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    async fn fetch_by<T: Document>(&self, field: &str, value: Value) -> Result<Vec<T>, StorageError> {
        self.list_by_field(T::COLLECTION, field, &value)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    async fn store<T: Document>(&self, doc: &T) -> Result<(), StorageError> {
        let value = encode(doc)?;
        self.save(T::COLLECTION, &doc.id(), value).await
    }

    async fn store_all<T: Document>(&self, docs: &[T]) -> Result<(), StorageError> {
        if docs.is_empty() {
            return Ok(());
        }
        let encoded = docs
            .iter()
            .map(|d| Ok((d.id(), encode(d)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;
        self.save_all(T::COLLECTION, encoded).await
    }

    async fn remove<T: Document>(&self, id: &str) -> Result<(), StorageError> {
        self.delete(T::COLLECTION, id).await
    }

    async fn remove_all<T: Document>(&self) -> Result<(), StorageError> {
        self.delete_all(T::COLLECTION).await
    }
}
