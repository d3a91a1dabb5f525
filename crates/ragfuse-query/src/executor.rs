//! Single-strategy search executors.

use std::sync::Arc;

use tracing::debug;

use ragfuse_core::{sort_candidates, Candidate, DocumentStore, ErrorKind, RagError, Result};

/// Nearest-neighbour search by cosine similarity.
pub struct VectorSearchExecutor<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for VectorSearchExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> VectorSearchExecutor<S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Up to `k` candidates, best first, ties by id.
    ///
    /// `min_score` is applied after retrieval, so fewer than `k` candidates
    /// may come back even when the collection holds more.
    pub async fn search(
        &self,
        embedding: &[f32],
        collection: &str,
        k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<Candidate>> {
        if embedding.is_empty() {
            return Err(RagError::invalid_argument("query vector is empty"));
        }

        let mut candidates = self
            .store
            .vector_search(embedding, collection, k, None)
            .await
            .map_err(as_backend_error)?;

        if let Some(min) = min_score {
            candidates.retain(|c| c.score >= min);
        }
        sort_candidates(&mut candidates);
        candidates.truncate(k);

        debug!("Vector executor: {} candidates from {}", candidates.len(), collection);
        Ok(candidates)
    }
}

/// Relevance-scored matches from the collection's text index.
pub struct LexicalSearchExecutor<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for LexicalSearchExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> LexicalSearchExecutor<S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Up to `k` candidates, best first, ties by id.
    pub async fn search(&self, text: &str, collection: &str, k: usize) -> Result<Vec<Candidate>> {
        let mut candidates = self
            .store
            .text_search(text, collection, k)
            .await
            .map_err(as_backend_error)?;

        sort_candidates(&mut candidates);
        candidates.truncate(k);

        debug!("Lexical executor: {} candidates from {}", candidates.len(), collection);
        Ok(candidates)
    }
}

/// Store failures keep their own variant when it is already a backend error
/// (so `TextIndexMissing` keeps its code); anything else becomes one.
fn as_backend_error(err: RagError) -> RagError {
    match err.kind() {
        ErrorKind::SearchBackend => err,
        _ => RagError::backend(err.to_string()),
    }
}
