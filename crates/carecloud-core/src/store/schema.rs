//! SQLite schema definition.

/// Complete database schema for the local document and blob stores.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Documents (collection-oriented, JSON bodies)
-- ============================================================================

CREATE TABLE IF NOT EXISTS documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,       -- delivery order
    collection TEXT NOT NULL,
    id TEXT NOT NULL,                            -- store-generated UUID
    body TEXT NOT NULL DEFAULT '{}',             -- JSON object
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq);

-- Bodies must be JSON objects
CREATE TRIGGER IF NOT EXISTS documents_check_body BEFORE INSERT ON documents
BEGIN
    SELECT CASE
        WHEN json_type(new.body) IS NOT 'object' THEN
            RAISE(ABORT, 'Document body must be a JSON object')
    END;
END;

-- ============================================================================
-- Blobs (path-addressed, one row per upload generation)
-- ============================================================================

CREATE TABLE IF NOT EXISTS blobs (
    generation INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,                          -- e.g. residents/{id}/documents/{file}
    token TEXT NOT NULL UNIQUE,                  -- download token for the URL
    sha256 TEXT,                                 -- hex digest, set on completion
    size INTEGER NOT NULL DEFAULT 0,
    content_type TEXT,
    complete INTEGER NOT NULL DEFAULT 0,         -- 1 once every chunk landed
    uploaded_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_blobs_path ON blobs(path, generation);

-- Content, one row per transferred chunk
CREATE TABLE IF NOT EXISTS blob_chunks (
    generation INTEGER NOT NULL REFERENCES blobs(generation),
    seq INTEGER NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (generation, seq)
);

"#;
