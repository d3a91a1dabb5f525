//! ragfuse-query - Hybrid search and answer engine
//!
//! This crate combines vector similarity search and lexical search with a
//! weighted, per-result-set max-normalized score fusion, and builds
//! retrieval-augmented answers on top of it.
//!
//! # Features
//!
//! - Vector, fulltext and hybrid search modes behind one façade
//! - Weighted fusion with graceful degradation when one side is empty
//! - RAG answers, multi-question and conversational variants, summaries
//!
//! # Example
//!
//! ```rust,ignore
//! use ragfuse_query::SearchEngine;
//! use std::sync::Arc;
//!
//! let engine = SearchEngine::new(Arc::new(store), Arc::new(embedder));
//! let results = engine.search_str("error handling", "hybrid", "documents", 10).await?;
//! ```

mod answer;
mod engine;
mod executor;
mod fusion;
mod prompt;

#[cfg(test)]
mod testing;

pub use answer::{
    Answer, AnswerEngine, AnswerOptions, ContextEntry, ConversationalAnswer, HistoryTurn,
};
pub use engine::SearchEngine;
pub use executor::{LexicalSearchExecutor, VectorSearchExecutor};
pub use fusion::{weighted_fusion, ScoreFusion};

// Re-export for convenience
pub use ragfuse_core::{FusedResult, SearchMode, SearchQuery, SearchResults};
