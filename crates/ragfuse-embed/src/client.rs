//! Dimension-checked wrapper around an embedding provider.

use std::sync::Arc;

use tracing::debug;

use ragfuse_core::{Embedder, ErrorKind, RagError, Result};

/// Turns query text into fixed-length vectors.
///
/// Provider failures surface as embedding errors and are never retried; the
/// calling search fails as a whole.
pub struct EmbeddingClient<E: ?Sized> {
    provider: Arc<E>,
    dimension: usize,
}

impl<E: ?Sized> Clone for EmbeddingClient<E> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            dimension: self.dimension,
        }
    }
}

impl<E> EmbeddingClient<E>
where
    E: Embedder + ?Sized,
{
    /// Wrap a provider, trusting the dimension it reports.
    pub fn new(provider: Arc<E>) -> Self {
        let dimension = provider.dimension();
        Self {
            provider,
            dimension,
        }
    }

    /// Wrap a provider and require a deployment-fixed dimension.
    pub fn with_dimension(provider: Arc<E>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::invalid_argument("embedding dimension must be positive"));
        }
        if provider.dimension() != dimension {
            return Err(RagError::EmbeddingDimension {
                expected: dimension,
                actual: provider.dimension(),
            });
        }
        Ok(Self {
            provider,
            dimension,
        })
    }

    /// The vector length every call returns.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.provider.embed(text).await.map_err(as_embedding_error)?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    /// Embed several texts; output order and length match the input.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self
            .provider
            .embed_batch(texts)
            .await
            .map_err(as_embedding_error)?;

        if vectors.len() != texts.len() {
            return Err(RagError::embedding(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        for v in &vectors {
            self.check_dimension(v)?;
        }

        debug!("Embedded batch of {} texts", texts.len());
        Ok(vectors)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::EmbeddingDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Any provider failure is reported as an embedding failure.
fn as_embedding_error(err: RagError) -> RagError {
    match err.kind() {
        ErrorKind::Embedding => err,
        _ => RagError::embedding(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::HashEmbedder;

    /// Provider that reports one dimension and returns another.
    struct LyingEmbedder;

    #[async_trait]
    impl Embedder for LyingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.5; 3])
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![0.5; 4]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::internal("connection refused"))
        }

        async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::internal("connection refused"))
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn test_embed_returns_fixed_dimension() {
        let client = EmbeddingClient::new(Arc::new(HashEmbedder::new(384)));
        let v = client.embed("hybrid search").await.unwrap();
        assert_eq!(v.len(), 384);
        assert_eq!(client.dimension(), 384);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let client = EmbeddingClient::new(Arc::new(HashEmbedder::new(64)));
        let batch = client.embed_batch(&["alpha", "beta", "gamma"]).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1], client.embed("beta").await.unwrap());
        assert_eq!(batch[2], client.embed("gamma").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let client = EmbeddingClient::new(Arc::new(HashEmbedder::new(8)));
        assert!(client.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_detected() {
        let client = EmbeddingClient::new(Arc::new(LyingEmbedder));
        let err = client.embed("x").await.unwrap_err();
        assert!(matches!(
            err,
            RagError::EmbeddingDimension {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_batch_length_mismatch_detected() {
        let client = EmbeddingClient::new(Arc::new(LyingEmbedder));
        let err = client.embed_batch(&["a", "b"]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Embedding);
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_embedding_error() {
        let client = EmbeddingClient::new(Arc::new(DownEmbedder));
        let err = client.embed("x").await.unwrap_err();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_with_dimension_rejects_wrong_provider() {
        let provider: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(768));
        assert!(EmbeddingClient::with_dimension(provider.clone(), 384).is_err());
        assert!(EmbeddingClient::with_dimension(provider, 768).is_ok());
    }
}
