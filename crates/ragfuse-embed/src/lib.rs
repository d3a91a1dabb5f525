//! ragfuse-embed - Embedding client and providers
//!
//! [`EmbeddingClient`] wraps any [`Embedder`] and enforces the fixed
//! dimension contract: every vector it hands out has exactly `D` entries,
//! and batches come back in input order with one vector per text.
//!
//! # Providers
//!
//! - [`OnnxEmbedder`]: sentence-transformer models (all-MiniLM-L6-v2 by
//!   default) through ONNX Runtime, mean pooled and L2 normalized.
//! - [`HashEmbedder`]: deterministic token-hash vectors that need no model
//!   files, for tests and offline setups.

mod client;
mod hash;
mod onnx;

pub use client::EmbeddingClient;
pub use hash::HashEmbedder;
pub use onnx::OnnxEmbedder;

// Re-export the Embedder trait for convenience
pub use ragfuse_core::Embedder;
