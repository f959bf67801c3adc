//! SQLite-backed document store.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    apply_writes, Document, DocumentStore, StoreError, StoreResult, WriteSet, SCHEMA,
};

/// Document store over a single SQLite connection.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Open store at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?",
            [collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn load_collection(conn: &Connection, collection: &str) -> StoreResult<Vec<Document>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, body
            FROM documents
            WHERE collection = ?
            ORDER BY seq
            "#,
        )?;

        let rows = stmt.query_map([collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row?;
            docs.push(Document {
                id,
                data: parse_body(&body)?,
            });
        }
        Ok(docs)
    }
}

fn parse_body(body: &str) -> StoreResult<Map<String, Value>> {
    match serde_json::from_str(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::InvalidDocument("body is not an object".into())),
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let conn = self.conn.lock()?;
        Self::load_collection(&conn, collection)
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let conn = self.conn.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(Document {
                id: id.to_string(),
                data: parse_body(&body)?,
            })),
            None => Ok(None),
        }
    }

    async fn add(&self, collection: &str, fields: WriteSet) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut body = Map::new();
        apply_writes(&mut body, fields, &now());

        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection, id, serde_json::to_string(&body)?],
        )?;

        debug!(collection, %id, "document added");
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: WriteSet) -> StoreResult<()> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        let mut body = match body {
            Some(body) => parse_body(&body)?,
            None => return Err(StoreError::NotFound(format!("{}/{}", collection, id))),
        };

        apply_writes(&mut body, fields, &now());

        tx.execute(
            r#"
            UPDATE documents SET
                body = ?3,
                updated_at = datetime('now')
            WHERE collection = ?1 AND id = ?2
            "#,
            params![collection, id, serde_json::to_string(&body)?],
        )?;
        tx.commit()?;

        debug!(collection, id, "document updated");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock()?;
        let rows_affected = conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;

        // Deleting a missing document is not an error
        debug!(collection, id, rows_affected, "document deleted");
        Ok(())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>> {
        let conn = self.conn.lock()?;
        let docs = Self::load_collection(&conn, collection)?;
        Ok(docs
            .into_iter()
            .filter(|doc| doc.data.get(field) == Some(value))
            .collect())
    }
}
