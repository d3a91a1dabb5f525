//! SQLite-based storage implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use ragfuse_core::{
    sort_candidates, Candidate, Collection, DatabaseConfig, Document, DocumentStore,
    MetadataFilter, RagError, Result, Stats,
};

use crate::schema::{SCHEMA, SCHEMA_VERSION};
use crate::vector::{bytes_to_vec, similarity_score, vec_to_bytes};

const DOCUMENT_COLUMNS: &str = "id, title, content, metadata, tags, embedding";

/// SQLite-based store implementation.
///
/// One connection is opened at startup and shared behind a blocking Mutex;
/// clones share the same connection.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_millis(30_000))
    }

    /// Open the database described by a config section.
    pub fn open_with_config(config: &DatabaseConfig) -> Result<Self> {
        Self::open_with_timeout(
            &config.path,
            Duration::from_millis(config.busy_timeout_ms as u64),
        )
    }

    fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::backend(format!("Failed to open database: {}", e)))?;

        conn.busy_timeout(busy_timeout)
            .map_err(|e| RagError::backend(format!("Failed to set busy timeout: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RagError::backend(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        let version: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| RagError::backend(format!("Failed to read schema version: {}", e)))?;
        if version > SCHEMA_VERSION {
            return Err(RagError::backend(format!(
                "Database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }

        conn.execute_batch(SCHEMA)
            .map_err(|e| RagError::backend(format!("Failed to initialize schema: {}", e)))?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| RagError::backend(format!("Failed to set schema version: {}", e)))?;

        info!("Database opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RagError::backend(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().map_err(|e| RagError::backend(e.to_string()))?;
        f(&conn)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    // Collection operations

    async fn create_collection(&self, collection: Collection) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collections (name, description, text_index, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    collection.name,
                    collection.description,
                    collection.text_index,
                    collection.created_at as i64,
                ],
            )
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    RagError::CollectionExists {
                        name: collection.name.clone(),
                    }
                } else {
                    RagError::backend(format!("Failed to create collection: {}", e))
                }
            })?;

            debug!("Created collection: {}", collection.name);
            Ok(())
        })
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT name, description, text_index, created_at FROM collections WHERE name = ?1",
                params![name],
                Self::row_to_collection,
            )
            .optional()
            .map_err(|e| RagError::backend(e.to_string()))
        })
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT name, description, text_index, created_at FROM collections ORDER BY name",
                )
                .map_err(|e| RagError::backend(e.to_string()))?;

            let collections = stmt
                .query_map([], Self::row_to_collection)
                .map_err(|e| RagError::backend(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::backend(e.to_string()))?;

            Ok(collections)
        })
    }

    async fn create_text_index(&self, collection: &str) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE collections SET text_index = 1 WHERE name = ?1",
                    params![collection],
                )
                .map_err(|e| RagError::backend(e.to_string()))?;

            if updated == 0 {
                return Err(RagError::CollectionNotFound {
                    name: collection.to_string(),
                });
            }

            info!("Text index configured for collection: {}", collection);
            Ok(())
        })
    }

    // Document operations

    async fn insert_document(&self, collection: &str, doc: Document) -> Result<()> {
        self.with_conn(|conn| {
            Self::require_collection(conn, collection)?;
            Self::upsert_row(conn, collection, &doc)
        })
    }

    async fn insert_documents(&self, collection: &str, docs: Vec<Document>) -> Result<()> {
        self.with_conn(|conn| {
            Self::require_collection(conn, collection)?;

            // Dropping the transaction on error rolls back earlier rows.
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::backend(format!("Failed to begin transaction: {}", e)))?;
            for doc in &docs {
                Self::upsert_row(&tx, collection, doc)?;
            }
            tx.commit()
                .map_err(|e| RagError::backend(format!("Failed to commit documents: {}", e)))?;

            debug!("Stored {} documents in {}", docs.len(), collection);
            Ok(())
        })
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM documents WHERE collection = ?1 AND id = ?2",
                    DOCUMENT_COLUMNS
                ),
                params![collection, id],
                |row| Self::row_to_document(row, true),
            )
            .optional()
            .map_err(|e| RagError::backend(e.to_string()))
        })
    }

    async fn set_embedding(&self, collection: &str, id: &str, embedding: &[f32]) -> Result<()> {
        let bytes = vec_to_bytes(embedding);
        self.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE documents SET embedding = ?3 WHERE collection = ?1 AND id = ?2",
                    params![collection, id, bytes],
                )
                .map_err(|e| RagError::backend(e.to_string()))?;

            if updated == 0 {
                return Err(RagError::DocumentNotFound { id: id.to_string() });
            }
            Ok(())
        })
    }

    async fn unembedded_documents(
        &self,
        collection: &str,
        limit: usize,
    ) -> Result<Vec<Document>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM documents WHERE collection = ?1 AND embedding IS NULL \
                     ORDER BY id LIMIT ?2",
                    DOCUMENT_COLUMNS
                ))
                .map_err(|e| RagError::backend(e.to_string()))?;

            let docs = stmt
                .query_map(params![collection, limit as i64], |row| {
                    Self::row_to_document(row, false)
                })
                .map_err(|e| RagError::backend(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::backend(e.to_string()))?;
            Ok(docs)
        })
    }

    // Search operations

    async fn vector_search(
        &self,
        embedding: &[f32],
        collection: &str,
        k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<Candidate>> {
        if k == 0 || embedding.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM documents WHERE collection = ?1 AND embedding IS NOT NULL",
                    DOCUMENT_COLUMNS
                ))
                .map_err(|e| RagError::backend(e.to_string()))?;

            let docs = stmt
                .query_map(params![collection], |row| Self::row_to_document(row, true))
                .map_err(|e| RagError::backend(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::backend(e.to_string()))?;

            Ok(docs)
        })?
        .into_iter()
        .filter_map(|mut doc| {
            let stored = doc.embedding.take()?;
            // Vectors from another model generation are not comparable.
            if stored.len() != embedding.len() {
                return None;
            }
            let score = similarity_score(embedding, &stored);
            match min_score {
                Some(min) if score < min => None,
                _ => Some(Candidate::new(doc, score)),
            }
        })
        .collect::<Vec<_>>();

        sort_candidates(&mut candidates);
        candidates.truncate(k);

        debug!(
            "Vector search in {}: {} candidates",
            collection,
            candidates.len()
        );
        Ok(candidates)
    }

    async fn text_search(&self, query: &str, collection: &str, k: usize) -> Result<Vec<Candidate>> {
        let indexed = self
            .get_collection(collection)
            .await?
            .map(|c| c.text_index)
            .unwrap_or(false);
        if !indexed {
            return Err(RagError::TextIndexMissing {
                collection: collection.to_string(),
            });
        }

        let fts_query = Self::escape_fts5_query(query);
        if fts_query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT d.id, d.title, d.content, d.metadata, d.tags, d.embedding,
                           bm25(documents_fts) AS rank
                    FROM documents_fts
                    JOIN documents d ON d.pk = documents_fts.rowid
                    WHERE documents_fts MATCH ?1 AND d.collection = ?2
                    ORDER BY rank, d.id
                    LIMIT ?3
                    "#,
                )
                .map_err(|e| RagError::backend(e.to_string()))?;

            let results = stmt
                .query_map(params![fts_query, collection, k as i64], |row| {
                    let doc = Self::row_to_document(row, false)?;
                    let rank: f64 = row.get(6)?;
                    // bm25() is lower-is-better; flip so higher means more relevant.
                    Ok(Candidate::new(doc, -rank as f32))
                })
                .map_err(|e| RagError::backend(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::backend(format!("Text search failed: {}", e)))?;

            debug!("Text search in {}: {} candidates", collection, results.len());
            Ok(results)
        })
    }

    async fn find(
        &self,
        collection: &str,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let docs = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM documents WHERE collection = ?1 ORDER BY id",
                    DOCUMENT_COLUMNS
                ))
                .map_err(|e| RagError::backend(e.to_string()))?;

            let docs = stmt
                .query_map(params![collection], |row| Self::row_to_document(row, false))
                .map_err(|e| RagError::backend(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::backend(e.to_string()))?;

            Ok(docs)
        })?;

        Ok(docs
            .into_iter()
            .filter(|d| filter.matches(d))
            .take(limit)
            .collect())
    }

    // Stats

    async fn get_stats(&self, collection: Option<&str>) -> Result<Stats> {
        let filter = collection.map(String::from);

        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64> {
                let n: i64 = match &filter {
                    Some(name) => conn.query_row(sql, params![name], |row| row.get(0)),
                    None => conn.query_row(sql, [], |row| row.get(0)),
                }
                .map_err(|e| RagError::backend(e.to_string()))?;
                Ok(n as u64)
            };

            let (collections, documents, embedded, text_indexed) = if filter.is_some() {
                (
                    count("SELECT COUNT(*) FROM collections WHERE name = ?1")?,
                    count("SELECT COUNT(*) FROM documents WHERE collection = ?1")?,
                    count(
                        "SELECT COUNT(*) FROM documents \
                         WHERE collection = ?1 AND embedding IS NOT NULL",
                    )?,
                    count("SELECT COUNT(*) FROM collections WHERE name = ?1 AND text_index = 1")?,
                )
            } else {
                (
                    count("SELECT COUNT(*) FROM collections")?,
                    count("SELECT COUNT(*) FROM documents")?,
                    count("SELECT COUNT(*) FROM documents WHERE embedding IS NOT NULL")?,
                    count("SELECT COUNT(*) FROM collections WHERE text_index = 1")?,
                )
            };

            Ok(Stats {
                collections,
                documents,
                embedded,
                text_indexed,
                filter: filter.clone(),
            })
        })
    }
}

// Helper methods
impl SqliteStore {
    fn collection_exists(conn: &Connection, name: &str) -> Result<bool> {
        conn.query_row(
            "SELECT 1 FROM collections WHERE name = ?1",
            params![name],
            |_| Ok(()),
        )
        .optional()
        .map(|r| r.is_some())
        .map_err(|e| RagError::backend(e.to_string()))
    }

    fn require_collection(conn: &Connection, name: &str) -> Result<()> {
        if Self::collection_exists(conn, name)? {
            Ok(())
        } else {
            Err(RagError::CollectionNotFound {
                name: name.to_string(),
            })
        }
    }

    /// Insert or replace one document keyed by `(collection, id)`.
    fn upsert_row(conn: &Connection, collection: &str, doc: &Document) -> Result<()> {
        let metadata = serde_json::to_string(&doc.metadata)?;
        let tags = serde_json::to_string(&doc.tags)?;
        let embedding = doc.embedding.as_deref().map(vec_to_bytes);

        conn.execute(
            r#"
            INSERT INTO documents (collection, id, title, content, metadata, tags, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (collection, id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                metadata = excluded.metadata,
                tags = excluded.tags,
                embedding = excluded.embedding
            "#,
            params![
                collection,
                doc.id,
                doc.title,
                doc.content,
                metadata,
                tags,
                embedding
            ],
        )
        .map_err(|e| RagError::backend(format!("Failed to insert document: {}", e)))?;

        debug!("Stored document {} in {}", doc.id, collection);
        Ok(())
    }

    fn row_to_collection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Collection> {
        Ok(Collection {
            name: row.get(0)?,
            description: row.get(1)?,
            text_index: row.get(2)?,
            created_at: row.get::<_, i64>(3)? as u64,
        })
    }

    /// Convert a row selected with [`DOCUMENT_COLUMNS`] to a Document.
    fn row_to_document(
        row: &rusqlite::Row<'_>,
        with_embedding: bool,
    ) -> rusqlite::Result<Document> {
        let metadata_str: String = row.get(3)?;
        let tags_str: String = row.get(4)?;
        let embedding = if with_embedding {
            row.get::<_, Option<Vec<u8>>>(5)?
                .and_then(|b| bytes_to_vec(&b))
        } else {
            None
        };

        Ok(Document {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
            tags: serde_json::from_str(&tags_str).unwrap_or_default(),
            embedding,
        })
    }

    /// Build an FTS5 query matching any of the query's terms.
    ///
    /// Terms are split on non-alphanumerics (as the unicode61 tokenizer does)
    /// and quoted, so FTS5 operators in user text are never interpreted.
    fn escape_fts5_query(query: &str) -> String {
        query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|term| !term.is_empty())
            .map(|term| format!("\"{}\"", term))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}
