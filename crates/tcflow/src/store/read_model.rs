//! Materialized read models as collection/id/JSON documents.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Document storage for projections.
///
/// Documents are JSON values keyed by `(collection, id)`. `get` on a
/// missing collection or id is an error, not an empty result.
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Insert or replace a document.
    async fn save(&self, collection: &str, id: &str, document: Value) -> Result<()>;

    /// Fetch one document.
    async fn get(&self, collection: &str, id: &str) -> Result<Value>;

    /// Fetch all documents in a collection.
    ///
    /// Filter semantics are implementation-defined; the in-memory
    /// reference ignores the filter and returns everything. Callers must
    /// not depend on more than "returns all".
    async fn query(&self, collection: &str, filter: Option<&Value>) -> Result<Vec<Value>>;

    /// Remove one document.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Drop every collection.
    async fn clear(&self) -> Result<()>;
}

/// In-memory reference read-model store.
#[derive(Debug, Default)]
pub struct MemoryReadModelStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryReadModelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadModelStore for MemoryReadModelStore {
    async fn save(&self, collection: &str, id: &str, document: Value) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Value> {
        let collections = self.collections.read().await;
        let docs = collections
            .get(collection)
            .ok_or_else(|| Error::NotFound(format!("collection {collection}")))?;
        docs.get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{collection}/{id}")))
    }

    async fn query(&self, collection: &str, _filter: Option<&Value>) -> Result<Vec<Value>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(format!("collection {collection}")))?;
        docs.remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("{collection}/{id}")))
    }

    async fn clear(&self) -> Result<()> {
        self.collections.write().await.clear();
        Ok(())
    }
}
