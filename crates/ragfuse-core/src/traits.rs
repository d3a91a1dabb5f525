//! Core traits defining the interfaces to external collaborators.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Candidate, Collection, Document, MetadataFilter, Stats};

/// Document store: vector search, lexical search and simple retrieval.
///
/// A single store instance is opened at startup and shared by every request.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // Collection operations
    async fn create_collection(&self, collection: Collection) -> Result<()>;
    async fn get_collection(&self, name: &str) -> Result<Option<Collection>>;
    async fn list_collections(&self) -> Result<Vec<Collection>>;

    /// Configure lexical search for a collection.
    async fn create_text_index(&self, collection: &str) -> Result<()>;

    // Document operations
    async fn insert_document(&self, collection: &str, doc: Document) -> Result<()>;

    /// Store every document or none of them.
    async fn insert_documents(&self, collection: &str, docs: Vec<Document>) -> Result<()>;

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>>;
    async fn set_embedding(&self, collection: &str, id: &str, embedding: &[f32]) -> Result<()>;

    /// Up to `limit` documents that have no embedding yet, ordered by id.
    async fn unembedded_documents(&self, collection: &str, limit: usize)
        -> Result<Vec<Document>>;

    // Search operations

    /// Nearest neighbours of `embedding` by cosine similarity.
    ///
    /// Returns at most `k` candidates. A collection with no embedded
    /// documents yields an empty list, not an error.
    async fn vector_search(
        &self,
        embedding: &[f32],
        collection: &str,
        k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<Candidate>>;

    /// Lexical relevance matches for `query`.
    ///
    /// Fails with `TextIndexMissing` when the collection has no text index.
    async fn text_search(&self, query: &str, collection: &str, k: usize)
        -> Result<Vec<Candidate>>;

    /// Unranked retrieval of documents passing `filter`, ordered by id.
    async fn find(
        &self,
        collection: &str,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<Document>>;

    // Stats
    async fn get_stats(&self, collection: Option<&str>) -> Result<Stats>;
}

/// Embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Parameters for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Optional system message.
    pub system: Option<String>,

    /// User prompt.
    pub prompt: String,

    /// Sampling temperature (0.0 to 2.0).
    pub temperature: f32,

    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Text generation provider (an LLM behind some API).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for the request.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Model identifier reported alongside answers.
    fn model(&self) -> &str;
}
