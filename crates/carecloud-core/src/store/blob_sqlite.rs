//! SQLite-backed blob store.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use super::{
    BlobError, BlobPath, BlobResult, BlobStore, UploadFile, UploadProgress, UploadedObject,
    SCHEMA,
};

/// Default transfer chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Object store keeping every upload generation as a row.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
    base_url: Url,
    chunk_size: usize,
}

impl SqliteBlobStore {
    /// Open store at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P, base_url: &str) -> BlobResult<Self> {
        Self::from_connection(Connection::open(path)?, base_url)
    }

    /// Create in-memory store (for testing).
    pub fn open_in_memory(base_url: &str) -> BlobResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, base_url)
    }

    fn from_connection(conn: Connection, base_url: &str) -> BlobResult<Self> {
        conn.execute_batch(SCHEMA)?;
        let base_url = Url::parse(base_url)
            .map_err(|e| BlobError::InvalidPath(format!("base url {:?}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BlobError::InvalidPath(format!(
                "base url {:?} cannot carry a path",
                base_url.as_str()
            )));
        }
        Ok(Self {
            conn: Mutex::new(conn),
            base_url,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Set the transfer chunk size. Zero is treated as one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Content of the latest complete generation at `path`.
    ///
    /// Generations still being staged are never served.
    pub fn read(&self, path: &BlobPath) -> BlobResult<Option<Vec<u8>>> {
        let conn = self.conn.lock()?;
        let generation: Option<i64> = conn
            .query_row(
                r#"
                SELECT generation FROM blobs
                WHERE path = ? AND complete = 1
                ORDER BY generation DESC
                LIMIT 1
                "#,
                [path.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(generation) = generation else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT data FROM blob_chunks WHERE generation = ? ORDER BY seq")?;
        let chunks = stmt.query_map([generation], |row| row.get::<_, Vec<u8>>(0))?;

        let mut content = Vec::new();
        for chunk in chunks {
            content.extend_from_slice(&chunk?);
        }
        Ok(Some(content))
    }

    /// Drop every generation whose upload never completed. Returns how many
    /// were dropped. An upload still streaming into one of them fails with
    /// [`BlobError::Interrupted`].
    pub fn purge_incomplete(&self) -> BlobResult<usize> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            DELETE FROM blob_chunks
            WHERE generation IN (SELECT generation FROM blobs WHERE complete = 0)
            "#,
            [],
        )?;
        let purged = tx.execute("DELETE FROM blobs WHERE complete = 0", [])?;
        tx.commit()?;

        if purged > 0 {
            debug!(purged, "incomplete uploads purged");
        }
        Ok(purged)
    }

    /// Number of stored generations at `path`.
    pub fn generation_count(&self, path: &BlobPath) -> BlobResult<usize> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM blobs WHERE path = ?",
            [path.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn download_url(&self, path: &BlobPath, token: &str) -> BlobResult<String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BlobError::InvalidPath(self.base_url.to_string()))?
            .pop_if_empty()
            .push(path.as_str());
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("token", token);
        Ok(url.into())
    }
}

fn interrupted(path: &BlobPath, transferred: u64, total_bytes: u64) -> BlobError {
    BlobError::Interrupted(format!(
        "{} after {} of {} bytes",
        path, transferred, total_bytes
    ))
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn upload(
        &self,
        path: &BlobPath,
        file: &UploadFile,
        progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> BlobResult<UploadedObject> {
        let total_bytes = file.bytes.len() as u64;
        let token = uuid::Uuid::new_v4().to_string();

        // Stage the generation; it stays invisible until marked complete
        let generation = {
            let conn = self.conn.lock()?;
            conn.execute(
                "INSERT INTO blobs (path, token, content_type) VALUES (?1, ?2, ?3)",
                params![path.as_str(), token, file.content_type],
            )?;
            conn.last_insert_rowid()
        };

        let mut hasher = Sha256::new();
        let mut transferred = 0u64;
        progress(UploadProgress {
            bytes_transferred: 0,
            total_bytes,
        });
        for (seq, chunk) in file.bytes.chunks(self.chunk_size).enumerate() {
            let written = {
                let conn = self.conn.lock()?;
                conn.execute(
                    r#"
                    INSERT INTO blob_chunks (generation, seq, data)
                    SELECT ?1, ?2, ?3
                    WHERE EXISTS (SELECT 1 FROM blobs WHERE generation = ?1 AND complete = 0)
                    "#,
                    params![generation, seq as i64, chunk],
                )?
            };
            if written == 0 {
                return Err(interrupted(path, transferred, total_bytes));
            }

            hasher.update(chunk);
            transferred += chunk.len() as u64;
            progress(UploadProgress {
                bytes_transferred: transferred,
                total_bytes,
            });
            tokio::task::yield_now().await;
        }

        let sha256 = hex::encode(hasher.finalize());
        let completed = {
            let conn = self.conn.lock()?;
            conn.execute(
                r#"
                UPDATE blobs SET sha256 = ?2, size = ?3, complete = 1
                WHERE generation = ?1 AND complete = 0
                "#,
                params![generation, sha256, total_bytes as i64],
            )?
        };
        if completed == 0 {
            return Err(interrupted(path, transferred, total_bytes));
        }

        debug!(path = %path, size = total_bytes, generation, "blob uploaded");
        Ok(UploadedObject {
            path: path.clone(),
            token,
            size: total_bytes,
            sha256,
        })
    }

    async fn resolve_url(&self, object: &UploadedObject) -> BlobResult<String> {
        let found: Option<i64> = {
            let conn = self.conn.lock()?;
            conn.query_row(
                "SELECT generation FROM blobs WHERE path = ?1 AND token = ?2 AND complete = 1",
                params![object.path.as_str(), object.token],
                |row| row.get(0),
            )
            .optional()?
        };

        match found {
            Some(_) => self.download_url(&object.path, &object.token),
            None => Err(BlobError::NotFound(object.path.to_string())),
        }
    }
}
