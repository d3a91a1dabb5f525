//! Database schema definitions.

/// Main schema SQL for initializing the database.
pub const SCHEMA: &str = r#"
-- Collections table
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    description TEXT,
    text_index INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

-- Documents table; embedding is little-endian f32
CREATE TABLE IF NOT EXISTS documents (
    pk INTEGER PRIMARY KEY,
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    id TEXT NOT NULL,
    title TEXT,
    content TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    tags TEXT NOT NULL DEFAULT '[]',
    embedding BLOB,
    UNIQUE (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);

-- FTS5 virtual table for lexical search
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    title,
    content,
    content=documents,
    content_rowid=pk
);

-- Triggers to keep FTS5 in sync with documents table
CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
    INSERT INTO documents_fts(rowid, title, content) VALUES (NEW.pk, NEW.title, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, title, content)
    VALUES ('delete', OLD.pk, OLD.title, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE OF title, content ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, title, content)
    VALUES ('delete', OLD.pk, OLD.title, OLD.content);
    INSERT INTO documents_fts(rowid, title, content) VALUES (NEW.pk, NEW.title, NEW.content);
END;
"#;

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
