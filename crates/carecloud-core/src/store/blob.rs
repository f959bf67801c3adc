//! Blob store seam: path-addressed uploads that resolve to retrieval URLs.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Blob store errors.
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload interrupted: {0}")]
    Interrupted(String),

    #[error("Blob store unavailable: {0}")]
    Unavailable(String),
}

impl<T> From<std::sync::PoisonError<T>> for BlobError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        BlobError::Unavailable(format!("Lock poisoned: {}", e))
    }
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Hierarchical object path, e.g. `residents/{id}/documents/{file}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobPath(String);

impl BlobPath {
    /// Build a path from segments. Each segment must be non-blank and free of `/`.
    pub fn from_segments(segments: &[&str]) -> BlobResult<Self> {
        if segments.is_empty() {
            return Err(BlobError::InvalidPath("empty path".into()));
        }
        for segment in segments {
            let reserved = *segment == "." || *segment == "..";
            if segment.trim().is_empty() || segment.contains('/') || reserved {
                return Err(BlobError::InvalidPath(format!(
                    "bad segment {:?} in {:?}",
                    segment, segments
                )));
            }
        }
        Ok(Self(segments.join("/")))
    }

    /// Photo path, keyed by the resident's full name.
    pub fn resident_photo(full_name: &str, file_name: &str) -> BlobResult<Self> {
        Self::from_segments(&["residents", full_name, file_name])
    }

    /// Document path, keyed by the resident's id.
    pub fn resident_document(resident_id: &str, file_name: &str) -> BlobResult<Self> {
        Self::from_segments(&["residents", resident_id, "documents", file_name])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file handed over by the caller for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    /// File name as chosen by the user (last path segment of the object)
    pub name: String,
    /// MIME type, if known
    pub content_type: Option<String>,
    /// Raw content
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Advisory transfer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Completed fraction in `[0, 1]`. Empty uploads count as complete.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.bytes_transferred as f64 / self.total_bytes as f64
        }
    }
}

/// A settled upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    /// Object path
    pub path: BlobPath,
    /// Download token of this generation
    pub token: String,
    /// Size in bytes
    pub size: u64,
    /// Hex SHA-256 of the content
    pub sha256: String,
}

/// Path-addressed object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream `file` to `path`. `progress` is called after each chunk and
    /// never gates completion.
    async fn upload(
        &self,
        path: &BlobPath,
        file: &UploadFile,
        progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> BlobResult<UploadedObject>;

    /// Durable retrieval URL for a settled upload.
    async fn resolve_url(&self, object: &UploadedObject) -> BlobResult<String>;
}
