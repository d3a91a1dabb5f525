//! ragfuse-store - SQLite document store
//!
//! Documents live in one table keyed by `(collection, id)`. Lexical search
//! runs on an FTS5 mirror of title and content kept in sync by triggers;
//! vector search is an exact cosine scan over the stored embeddings, scored
//! as `(1 + cos) / 2` so every vector score lies in [0, 1].

mod schema;
mod sqlite;
mod vector;

pub use sqlite::SqliteStore;
pub use vector::{cosine_similarity, similarity_score};
