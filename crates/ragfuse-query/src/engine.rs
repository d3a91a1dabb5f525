//! Unified search façade.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use ragfuse_core::{
    DocumentStore, Embedder, FusedResult, RagError, Result, SearchConfig, SearchMode,
    SearchQuery, SearchResults, MIN_OVERFETCH_FACTOR,
};
use ragfuse_embed::EmbeddingClient;

use crate::executor::{LexicalSearchExecutor, VectorSearchExecutor};
use crate::fusion::ScoreFusion;

/// Search façade dispatching on [`SearchMode`].
///
/// - `vector`: embed the query, return the vector executor's results.
/// - `fulltext`: return the lexical executor's results.
/// - `hybrid`: embed, run both executors concurrently with an over-fetched
///   `k`, fuse, truncate to the limit.
///
/// The engine holds no per-call state; concurrent searches share it freely.
pub struct SearchEngine<S: ?Sized, E: ?Sized> {
    embedder: EmbeddingClient<E>,
    vector: VectorSearchExecutor<S>,
    lexical: LexicalSearchExecutor<S>,
    fusion: ScoreFusion,
    overfetch_factor: usize,
    min_score: Option<f32>,
}

impl<S, E> SearchEngine<S, E>
where
    S: DocumentStore + ?Sized,
    E: Embedder + ?Sized,
{
    /// Build an engine over one store and one embedding provider.
    pub fn new(store: Arc<S>, embedder: Arc<E>) -> Self {
        Self::from_parts(
            EmbeddingClient::new(embedder),
            VectorSearchExecutor::new(Arc::clone(&store)),
            LexicalSearchExecutor::new(store),
            ScoreFusion::default(),
        )
    }

    /// Assemble an engine from explicit collaborators.
    pub fn from_parts(
        embedder: EmbeddingClient<E>,
        vector: VectorSearchExecutor<S>,
        lexical: LexicalSearchExecutor<S>,
        fusion: ScoreFusion,
    ) -> Self {
        Self {
            embedder,
            vector,
            lexical,
            fusion,
            overfetch_factor: MIN_OVERFETCH_FACTOR,
            min_score: None,
        }
    }

    /// Apply the fusion weight, over-fetch factor and score floor from config.
    ///
    /// An over-fetch factor below [`MIN_OVERFETCH_FACTOR`] is rejected.
    pub fn with_config(mut self, config: &SearchConfig) -> Result<Self> {
        if config.overfetch_factor < MIN_OVERFETCH_FACTOR {
            return Err(RagError::invalid_argument(format!(
                "overfetch_factor must be at least {}, got {}",
                MIN_OVERFETCH_FACTOR, config.overfetch_factor
            )));
        }
        self.fusion = ScoreFusion::new(config.vector_weight)?;
        self.overfetch_factor = config.overfetch_factor;
        self.min_score = config.min_score;
        Ok(self)
    }

    /// The embedding client, shared with ingestion.
    pub fn embedder(&self) -> &EmbeddingClient<E> {
        &self.embedder
    }

    /// Parse `mode` and search. Unknown modes fail; there is no fallback mode.
    pub async fn search_str(
        &self,
        text: &str,
        mode: &str,
        collection: &str,
        limit: usize,
    ) -> Result<SearchResults> {
        let mode: SearchMode = mode.parse()?;
        self.search(&SearchQuery::new(text, mode, collection, limit))
            .await
    }

    /// Run one search.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        query.validate()?;
        let start = Instant::now();

        info!(
            "Searching {:?} in {} (mode={}, limit={})",
            query.text, query.collection, query.mode, query.limit
        );

        let min_score = query.min_score.or(self.min_score);

        let results = match query.mode {
            SearchMode::Vector => {
                let embedding = self.embedder.embed(&query.text).await?;
                self.vector
                    .search(&embedding, &query.collection, query.limit, min_score)
                    .await?
                    .into_iter()
                    .map(FusedResult::from)
                    .collect::<Vec<_>>()
            }
            SearchMode::Fulltext => self
                .lexical
                .search(&query.text, &query.collection, query.limit)
                .await?
                .into_iter()
                .map(FusedResult::from)
                .collect(),
            SearchMode::Hybrid => self.hybrid(query, min_score).await?,
        };

        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            "Search completed in {}ms, returned {} results",
            latency_ms,
            results.len()
        );

        Ok(SearchResults {
            query: query.text.clone(),
            mode: query.mode,
            collection: query.collection.clone(),
            total: results.len(),
            latency_ms,
            results,
        })
    }

    async fn hybrid(
        &self,
        query: &SearchQuery,
        min_score: Option<f32>,
    ) -> Result<Vec<FusedResult>> {
        let fetch_k = query.limit * self.overfetch_factor;
        let embedding = self.embedder.embed(&query.text).await?;

        // First failure aborts the request; partial results are never fused.
        let (vector_hits, text_hits) = tokio::try_join!(
            self.vector
                .search(&embedding, &query.collection, fetch_k, min_score),
            self.lexical.search(&query.text, &query.collection, fetch_k)
        )?;

        debug!(
            "Vector search returned {} results, lexical search returned {} results",
            vector_hits.len(),
            text_hits.len()
        );

        if vector_hits.is_empty() != text_hits.is_empty() {
            warn!(
                "Hybrid search in {} degraded to {} results only",
                query.collection,
                if vector_hits.is_empty() { "lexical" } else { "vector" }
            );
        }

        self.fusion
            .fuse(vector_hits, text_hits, query.vector_weight, query.limit)
    }
}
