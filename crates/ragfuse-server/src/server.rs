//! Tool server implementation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ragfuse_core::{
    Collection, Document, DocumentStore, Embedder, EmbeddingProvider, MetadataFilter, RagConfig,
    RagError, Result, SearchConfig, SearchQuery, TextGenerator,
};
use ragfuse_embed::{HashEmbedder, OnnxEmbedder};
use ragfuse_llm::ChatClient;
use ragfuse_query::{AnswerEngine, AnswerOptions, HistoryTurn, SearchEngine};
use ragfuse_store::SqliteStore;

type Engine = SearchEngine<dyn DocumentStore, dyn Embedder>;
type Answers = AnswerEngine<dyn DocumentStore, dyn Embedder, dyn TextGenerator>;

/// Characters of content shown per search hit.
const SNIPPET_CHARS: usize = 200;

/// RAG tool server state.
pub struct RagServer {
    store: Arc<dyn DocumentStore>,
    engine: Arc<Engine>,
    answers: Answers,
    search: SearchConfig,
}

/// Search request parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct SearchParams {
    /// The search query.
    pub query: String,

    /// `vector`, `fulltext` or `hybrid` (default: hybrid).
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Maximum number of results (default from config).
    pub limit: Option<usize>,

    /// Collection to search (default from config).
    pub collection: Option<String>,

    /// Vector share of the hybrid score (default from config).
    pub vector_weight: Option<f32>,

    /// Drop vector candidates scoring below this (default from config).
    #[serde(default)]
    pub min_score: Option<f32>,
}

fn default_mode() -> String {
    "hybrid".to_string()
}

/// Question answering parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct AskParams {
    pub question: String,

    /// Earlier turns; when present the last question is folded into the query.
    #[serde(default)]
    pub history: Vec<HistoryTurn>,

    #[serde(flatten)]
    pub options: AnswerOptions,
}

/// Parameters for answering several questions with shared options.
#[derive(Debug, Deserialize, Serialize)]
pub struct AskManyParams {
    pub questions: Vec<String>,

    #[serde(flatten)]
    pub options: AnswerOptions,
}

/// Summarization parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct SummarizeParams {
    pub text: String,

    #[serde(default = "default_summary_tokens")]
    pub max_tokens: u32,
}

fn default_summary_tokens() -> u32 {
    256
}

/// Ingest request parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IngestParams {
    /// Collection to ingest into (default from config).
    #[serde(default)]
    pub collection: Option<String>,

    /// Document id; derived from the content when absent.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    pub content: String,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl IngestParams {
    fn into_document(self) -> Document {
        let doc = match self.id.as_deref() {
            Some(id) => Document::with_id(id, self.title.as_deref(), &self.content),
            None => Document::new(self.title.as_deref(), &self.content),
        };
        Document {
            metadata: self.metadata,
            ..doc.with_tags(self.tags)
        }
    }
}

/// Filtered retrieval parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct FindParams {
    #[serde(default)]
    pub collection: Option<String>,

    #[serde(default)]
    pub filter: MetadataFilter,

    #[serde(default = "default_find_limit")]
    pub limit: usize,
}

fn default_find_limit() -> usize {
    20
}

/// Collection parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct CollectionParams {
    /// Collection name.
    pub name: String,

    /// Description (optional).
    pub description: Option<String>,

    /// Enable lexical search right away.
    #[serde(default)]
    pub text_index: bool,
}

/// Tool result.
#[derive(Debug, Serialize)]
pub struct ToolResult {
    /// Whether the operation was successful.
    pub success: bool,

    /// Result message or content.
    pub message: String,

    /// Stable error code on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_code: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code: None,
        }
    }

    /// Failure carrying the error's code.
    pub fn failure(context: &str, err: &RagError) -> Self {
        Self {
            success: false,
            message: format!("{}: {}", context, err),
            error_code: Some(err.error_code()),
        }
    }
}

impl RagServer {
    /// Assemble a server from explicit collaborators.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
        search: SearchConfig,
    ) -> Result<Self> {
        let engine =
            Arc::new(SearchEngine::new(Arc::clone(&store), embedder).with_config(&search)?);
        let answers =
            AnswerEngine::new(Arc::clone(&engine), generator, &search.default_collection);

        Ok(Self {
            store,
            engine,
            answers,
            search,
        })
    }

    /// Open the configured database and build the configured providers.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        info!("Initializing RAG server with database at {:?}", config.database.path);

        let store: Arc<dyn DocumentStore> =
            Arc::new(SqliteStore::open_with_config(&config.database)?);

        let embedder: Arc<dyn Embedder> = match config.embedding.provider {
            EmbeddingProvider::Onnx => Arc::new(OnnxEmbedder::from_dir(
                &config.embedding.model_path,
                config.embedding.num_threads,
            )?),
            EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(config.embedding.dimension)),
        };
        if embedder.dimension() != config.embedding.dimension {
            return Err(RagError::EmbeddingDimension {
                expected: config.embedding.dimension,
                actual: embedder.dimension(),
            });
        }

        let generator: Arc<dyn TextGenerator> = Arc::new(ChatClient::from_config(&config.llm)?);

        Self::new(store, embedder, generator, config.search.clone())
    }

    /// In-memory store with hash embeddings and the default chat endpoint.
    pub fn new_memory() -> Result<Self> {
        info!("Initializing RAG server with in-memory database");

        let config = RagConfig::default();
        Self::new(
            Arc::new(SqliteStore::open_memory()?),
            Arc::new(HashEmbedder::new(config.embedding.dimension)),
            Arc::new(ChatClient::from_config(&config.llm)?),
            config.search,
        )
    }

    /// Get the server info.
    pub fn info() -> ServerInfo {
        ServerInfo {
            name: "ragfuse".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Hybrid vector and lexical search with retrieval-augmented answers"
                .to_string(),
        }
    }

    /// List available tools.
    pub fn tools() -> Vec<ToolInfo> {
        [
            ("rag_search", "Search a collection (vector, fulltext or hybrid)"),
            ("rag_ask", "Answer a question from retrieved documents"),
            ("rag_ask_many", "Answer several questions with shared options"),
            ("rag_summarize", "Summarize a piece of text"),
            ("rag_ingest", "Embed and store a document"),
            ("rag_embed_missing", "Embed stored documents that have no vector"),
            ("rag_find", "Retrieve documents by metadata or tag"),
            ("rag_list_collections", "List all collections"),
            ("rag_create_collection", "Create a new collection"),
            ("rag_create_text_index", "Enable lexical search on a collection"),
            ("rag_stats", "Get statistics about the store"),
        ]
        .into_iter()
        .map(|(name, description)| ToolInfo {
            name: name.to_string(),
            description: description.to_string(),
        })
        .collect()
    }

    fn collection_or_default<'a>(&'a self, collection: Option<&'a str>) -> &'a str {
        collection.unwrap_or(&self.search.default_collection)
    }

    /// Search a collection.
    pub async fn search(&self, params: SearchParams) -> ToolResult {
        let collection = self.collection_or_default(params.collection.as_deref());
        let limit = params.limit.unwrap_or(self.search.default_limit);

        let mode = match params.mode.parse() {
            Ok(mode) => mode,
            Err(e) => return ToolResult::failure("Search failed", &e),
        };
        if limit > self.search.max_limit {
            return ToolResult::failure(
                "Search failed",
                &RagError::invalid_argument(format!(
                    "limit must be at most {}",
                    self.search.max_limit
                )),
            );
        }
        let mut query = SearchQuery::new(&params.query, mode, collection, limit);
        if let Some(w) = params.vector_weight {
            query = query.with_vector_weight(w);
        }
        if let Some(min) = params.min_score {
            query = query.with_min_score(min);
        }

        match self.engine.search(&query).await {
            Ok(results) => {
                let mut output = format!(
                    "Found {} results in {}ms ({} search in '{}'):\n\n",
                    results.total, results.latency_ms, results.mode, results.collection
                );

                for (rank, result) in results.results.iter().enumerate() {
                    output.push_str(&format!(
                        "---\n[{}] {} ({}) (score: {:.3})\n",
                        rank + 1,
                        result.document.title.as_deref().unwrap_or("Untitled"),
                        result.id(),
                        result.score
                    ));
                    output.push_str(&snippet(result.document.content.as_deref().unwrap_or("")));
                    output.push_str("\n\n");
                }

                ToolResult::success(output)
            }
            Err(e) => ToolResult::failure("Search failed", &e),
        }
    }

    /// Answer a question from retrieved context.
    pub async fn ask(&self, params: AskParams) -> ToolResult {
        let result = if params.history.is_empty() {
            self.answers.answer(&params.question, &params.options).await
        } else {
            self.answers
                .answer_with_history(&params.question, &params.history, &params.options)
                .await
                .map(|c| c.answer)
        };

        match result {
            Ok(answer) => {
                let mut output = format!("{}\n", answer.answer);
                if !answer.context.is_empty() {
                    output.push_str(&format!("\nSources (model: {}):\n", answer.model));
                    for (i, entry) in answer.context.iter().enumerate() {
                        output.push_str(&format!(
                            "- [{}] {} ({}) (score: {:.3})\n",
                            i + 1,
                            if entry.title.is_empty() { "Untitled" } else { &entry.title },
                            entry.id,
                            entry.score
                        ));
                    }
                }
                ToolResult::success(output)
            }
            Err(e) => ToolResult::failure("Answer failed", &e),
        }
    }

    /// Answer several questions in order; the first failure fails the call.
    pub async fn ask_many(&self, params: AskManyParams) -> ToolResult {
        if params.questions.is_empty() {
            return ToolResult::failure(
                "Answer failed",
                &RagError::invalid_argument("no questions given"),
            );
        }

        match self
            .answers
            .answer_many(&params.questions, &params.options)
            .await
        {
            Ok(answers) => {
                let mut output = String::new();
                for (i, answer) in answers.iter().enumerate() {
                    output.push_str(&format!(
                        "---\n[{}] {}\n{}\n({} sources, model: {})\n\n",
                        i + 1,
                        answer.question,
                        answer.answer,
                        answer.context.len(),
                        answer.model
                    ));
                }
                ToolResult::success(output)
            }
            Err(e) => ToolResult::failure("Answer failed", &e),
        }
    }

    /// Summarize text.
    pub async fn summarize(&self, params: SummarizeParams) -> ToolResult {
        match self.answers.summarize(&params.text, params.max_tokens).await {
            Ok(summary) => ToolResult::success(summary),
            Err(e) => ToolResult::failure("Summary failed", &e),
        }
    }

    /// Embed and store one document.
    pub async fn ingest(&self, params: IngestParams) -> ToolResult {
        let collection = self
            .collection_or_default(params.collection.as_deref())
            .to_string();
        info!("Ingesting document into {}", collection);

        match self.ingest_into(&collection, vec![params]).await {
            Ok(ids) => ToolResult::success(format!(
                "Ingested document '{}' into '{}'.",
                ids.join(", "),
                collection
            )),
            Err(e) => ToolResult::failure("Ingest failed", &e),
        }
    }

    /// Embed and store several documents into one collection, batching the
    /// embedding calls.
    pub async fn ingest_many(
        &self,
        collection: Option<&str>,
        docs: Vec<IngestParams>,
    ) -> ToolResult {
        let collection = self.collection_or_default(collection).to_string();
        if docs.is_empty() {
            return ToolResult::success("Nothing to ingest.");
        }
        info!("Ingesting {} documents into {}", docs.len(), collection);

        match self.ingest_into(&collection, docs).await {
            Ok(ids) => ToolResult::success(format!(
                "Ingested {} documents into '{}'.",
                ids.len(),
                collection
            )),
            Err(e) => ToolResult::failure("Ingest failed", &e),
        }
    }

    async fn ingest_into(
        &self,
        collection: &str,
        params: Vec<IngestParams>,
    ) -> Result<Vec<String>> {
        if self.store.get_collection(collection).await?.is_none() {
            return Err(RagError::CollectionNotFound {
                name: collection.to_string(),
            });
        }

        let mut docs = Vec::with_capacity(params.len());
        for p in params {
            if p.content.trim().is_empty() {
                return Err(RagError::invalid_argument("document content is empty"));
            }
            docs.push(p.into_document());
        }

        for batch in docs.chunks_mut(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(Document::embedding_text).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let vectors = self.engine.embedder().embed_batch(&refs).await?;

            for (doc, vector) in batch.iter_mut().zip(vectors) {
                doc.embedding = Some(vector);
            }
        }

        let ids = docs.iter().map(|d| d.id.clone()).collect();
        self.store.insert_documents(collection, docs).await?;
        Ok(ids)
    }

    /// Embed documents stored without a vector, in batches.
    pub async fn embed_missing(&self, collection: Option<&str>) -> ToolResult {
        let collection = self.collection_or_default(collection).to_string();

        match self.backfill(&collection).await {
            Ok(0) => ToolResult::success(format!(
                "Every document in '{}' already has an embedding.",
                collection
            )),
            Ok(count) => ToolResult::success(format!(
                "Embedded {} documents in '{}'.",
                count, collection
            )),
            Err(e) => ToolResult::failure("Embedding backfill failed", &e),
        }
    }

    async fn backfill(&self, collection: &str) -> Result<usize> {
        if self.store.get_collection(collection).await?.is_none() {
            return Err(RagError::CollectionNotFound {
                name: collection.to_string(),
            });
        }

        let mut embedded = 0;
        loop {
            let pending = self
                .store
                .unembedded_documents(collection, EMBED_BATCH)
                .await?;
            if pending.is_empty() {
                break;
            }

            let texts: Vec<String> = pending.iter().map(Document::embedding_text).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let vectors = self.engine.embedder().embed_batch(&refs).await?;

            for (doc, vector) in pending.iter().zip(&vectors) {
                self.store.set_embedding(collection, &doc.id, vector).await?;
            }
            embedded += pending.len();
            info!("Embedded {} documents in {} so far", embedded, collection);
        }
        Ok(embedded)
    }

    /// Filtered retrieval without ranking.
    pub async fn find(&self, params: FindParams) -> ToolResult {
        let collection = self.collection_or_default(params.collection.as_deref());
        match self.store.find(collection, &params.filter, params.limit).await {
            Ok(docs) => {
                let mut output = format!("Found {} documents in '{}':\n\n", docs.len(), collection);
                for doc in docs {
                    output.push_str(&format!(
                        "- {} ({})\n",
                        doc.title.as_deref().unwrap_or("Untitled"),
                        doc.id
                    ));
                }
                ToolResult::success(output)
            }
            Err(e) => ToolResult::failure("Find failed", &e),
        }
    }

    /// List all collections.
    pub async fn list_collections(&self) -> ToolResult {
        match self.store.list_collections().await {
            Ok(collections) => {
                if collections.is_empty() {
                    return ToolResult::success("No collections found.");
                }

                let mut output = format!("Found {} collections:\n\n", collections.len());
                for coll in collections {
                    output.push_str(&format!(
                        "- {}{}: {}\n",
                        coll.name,
                        if coll.text_index { " [text index]" } else { "" },
                        coll.description.as_deref().unwrap_or("(no description)")
                    ));
                }

                ToolResult::success(output)
            }
            Err(e) => ToolResult::failure("Failed to list collections", &e),
        }
    }

    /// Create a new collection.
    pub async fn create_collection(&self, params: CollectionParams) -> ToolResult {
        info!("Creating collection: {}", params.name);

        if params.name.trim().is_empty() {
            return ToolResult::failure(
                "Failed to create collection",
                &RagError::invalid_argument("collection name is empty"),
            );
        }

        let mut collection = Collection::new(&params.name, params.description.as_deref());
        collection.text_index = params.text_index;

        match self.store.create_collection(collection).await {
            Ok(()) => ToolResult::success(format!("Collection '{}' created.", params.name)),
            Err(e) => ToolResult::failure("Failed to create collection", &e),
        }
    }

    /// Enable lexical search on a collection.
    pub async fn create_text_index(&self, name: &str) -> ToolResult {
        match self.store.create_text_index(name).await {
            Ok(()) => ToolResult::success(format!("Text index ready on '{}'.", name)),
            Err(e) => {
                warn!("Text index creation failed for {}: {}", name, e);
                ToolResult::failure("Failed to create text index", &e)
            }
        }
    }

    /// Get statistics.
    pub async fn stats(&self, collection: Option<&str>) -> ToolResult {
        match self.store.get_stats(collection).await {
            Ok(stats) => {
                let mut output = String::new();

                if let Some(coll) = collection {
                    output.push_str(&format!("Statistics for collection '{}':\n\n", coll));
                } else {
                    output.push_str("Overall statistics:\n\n");
                }

                output.push_str(&format!("- Collections: {}\n", stats.collections));
                output.push_str(&format!("- Text indexed: {}\n", stats.text_indexed));
                output.push_str(&format!("- Documents: {}\n", stats.documents));
                output.push_str(&format!("- Embedded: {}\n", stats.embedded));

                ToolResult::success(output)
            }
            Err(e) => ToolResult::failure("Failed to get stats", &e),
        }
    }
}

/// Documents per embedding call during ingest.
const EMBED_BATCH: usize = 32;

fn snippet(content: &str) -> String {
    match content.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Server info.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// Tool info.
#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}
