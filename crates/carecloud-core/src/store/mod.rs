//! Store seams for the resident synchronization layer.
//!
//! Two remote collaborators sit behind traits here:
//!
//! - [`DocumentStore`]: collection-oriented documents addressed by
//!   collection name and a store-generated id.
//! - [`BlobStore`]: path-addressed binary objects that yield a retrieval URL
//!   once an upload settles.
//!
//! The SQLite-backed implementations ([`SqliteDocumentStore`],
//! [`SqliteBlobStore`]) are what the service runs against locally and in tests.

mod blob;
mod blob_sqlite;
mod schema;
mod sqlite;

pub use blob::*;
pub use blob_sqlite::*;
pub use schema::*;
pub use sqlite::*;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Collection names used by the data-access layer.
pub mod collections {
    pub const RESIDENTS: &str = "residents";
    pub const ACTIVITIES: &str = "activities";
    pub const INCIDENTS: &str = "incidents";
}

/// Document store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        StoreError::Unavailable(format!("Lock poisoned: {}", e))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored document: the store-assigned id plus its body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    /// Body merged with the id under the `id` key.
    pub fn into_value(self) -> Value {
        let mut data = self.data;
        data.insert("id".to_string(), Value::String(self.id));
        Value::Object(data)
    }
}

/// A single field write.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    /// Replace the field with this value.
    Set(Value),
    /// Stamp the field with the store's own clock at write time.
    ServerTimestamp,
    /// Append each element not already present in the array field,
    /// creating the array if the field is absent.
    ArrayUnion(Vec<Value>),
}

/// Field name to write. Fields not named are left untouched.
pub type WriteSet = BTreeMap<String, FieldWrite>;

/// Build a write set of plain `Set` writes from a serialized object.
pub fn set_all(value: Value) -> StoreResult<WriteSet> {
    match value {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(field, value)| (field, FieldWrite::Set(value)))
            .collect()),
        other => Err(StoreError::InvalidDocument(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Collection-oriented document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents of a collection, in store delivery order.
    async fn get_all(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// A single document, or `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Insert a new document and return the id the store generated for it.
    async fn add(&self, collection: &str, fields: WriteSet) -> StoreResult<String>;

    /// Partial merge of `fields` into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: WriteSet) -> StoreResult<()>;

    /// Remove a document.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Documents whose top-level `field` equals `value` exactly.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>>;
}

/// Apply a write set to a document body at time `now`.
pub(crate) fn apply_writes(body: &mut Map<String, Value>, fields: WriteSet, now: &str) {
    for (field, write) in fields {
        match write {
            FieldWrite::Set(value) => {
                body.insert(field, value);
            }
            FieldWrite::ServerTimestamp => {
                body.insert(field, Value::String(now.to_string()));
            }
            FieldWrite::ArrayUnion(elements) => {
                let entry = body
                    .entry(field)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !entry.is_array() {
                    *entry = Value::Array(Vec::new());
                }
                if let Value::Array(existing) = entry {
                    for element in elements {
                        if !existing.contains(&element) {
                            existing.push(element);
                        }
                    }
                }
            }
        }
    }
}
