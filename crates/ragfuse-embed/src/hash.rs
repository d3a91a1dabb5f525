//! Deterministic token-hash embeddings.

use async_trait::async_trait;

use ragfuse_core::{Embedder, Result};

use crate::onnx::l2_normalize;

/// Feature-hashing embedder.
///
/// Every lowercase alphanumeric token is hashed (FNV-1a) into one of `D`
/// buckets with a hash-derived sign; the bag is then L2 normalized. Texts
/// sharing vocabulary land close together under cosine similarity, which is
/// enough for tests and for running without model files.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(v)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, &b| (h ^ b as u64).wrapping_mul(PRIME))
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_normalized_output() {
        let embedder = HashEmbedder::new(384);
        let v = embedder.embed("Rust is a systems language").await.unwrap();
        assert_eq!(v.len(), 384);

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("consistent input").await.unwrap();
        let b = embedder.embed("consistent input").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_case_and_punctuation_insensitive() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("Vector Search!").await.unwrap();
        let b = embedder.embed("vector, search").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_is_closer() {
        let embedder = HashEmbedder::new(384);
        let query = embedder.embed("hybrid vector search").await.unwrap();
        let near = embedder.embed("vector search engines").await.unwrap();
        let far = embedder.embed("baking sourdough bread").await.unwrap();
        assert!(dot(&query, &near) > dot(&query, &far));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed("  ").await.unwrap();
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
