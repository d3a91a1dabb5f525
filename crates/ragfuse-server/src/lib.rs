//! ragfuse-server - Tool surface for hybrid search and answers
//!
//! [`RagServer`] wires a document store, an embedding provider and a text
//! generator together and exposes them as tools returning [`ToolResult`].
//!
//! # Tools
//!
//! - `rag_search` - Vector, fulltext or hybrid search
//! - `rag_ask` - Answer a question from retrieved context
//! - `rag_ask_many` - Answer several questions with shared options
//! - `rag_summarize` - Summarize a piece of text
//! - `rag_ingest` - Embed and store a document
//! - `rag_embed_missing` - Embed stored documents that have no vector
//! - `rag_find` - Filtered retrieval by metadata or tag
//! - `rag_list_collections` - List all collections
//! - `rag_create_collection` - Create a new collection
//! - `rag_create_text_index` - Enable lexical search on a collection
//! - `rag_stats` - Get statistics about the store

mod loader;
mod server;

pub use loader::load_documents;
pub use server::{
    AskManyParams, AskParams, CollectionParams, FindParams, IngestParams, RagServer, SearchParams,
    ServerInfo, SummarizeParams, ToolInfo, ToolResult,
};
