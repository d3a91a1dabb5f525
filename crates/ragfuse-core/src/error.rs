//! Error types for hybrid retrieval and answering.

use thiserror::Error;

/// Result type alias using RagError.
pub type Result<T> = std::result::Result<T, RagError>;

/// Coarse error categories surfaced to callers.
///
/// Several variants of [`RagError`] share a kind; `TextIndexMissing` is a
/// search-backend failure but keeps its own error code so operators can tell
/// a missing index apart from an unreachable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Embedding,
    SearchBackend,
    InvalidMode,
    InvalidArgument,
    Generation,
    Config,
    Internal,
}

/// Errors that can occur in the retrieval and answering pipeline.
#[derive(Error, Debug)]
pub enum RagError {
    /// Embedding provider failed or was unreachable.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Embedding provider returned a vector of the wrong length.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimension { expected: usize, actual: usize },

    /// Document store failure.
    #[error("Search backend error: {message}")]
    SearchBackend { message: String },

    /// Lexical search requested on a collection without a text index.
    #[error("No text index configured for collection: {collection}")]
    TextIndexMissing { collection: String },

    /// Unrecognized search mode.
    #[error("Invalid search mode: {mode:?} (expected vector, fulltext or hybrid)")]
    InvalidMode { mode: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Collection not found.
    #[error("Collection not found: {name}")]
    CollectionNotFound { name: String },

    /// Collection already exists.
    #[error("Collection already exists: {name}")]
    CollectionExists { name: String },

    /// Document not found.
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    /// Text generation provider failed.
    #[error("Generation error: {message}")]
    Generation { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RagError {
    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a search backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::SearchBackend {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Taxonomy category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Embedding { .. } | Self::EmbeddingDimension { .. } => ErrorKind::Embedding,
            Self::SearchBackend { .. }
            | Self::TextIndexMissing { .. }
            | Self::CollectionNotFound { .. }
            | Self::CollectionExists { .. }
            | Self::DocumentNotFound { .. }
            | Self::Io(_) => ErrorKind::SearchBackend,
            Self::InvalidMode { .. } => ErrorKind::InvalidMode,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Generation { .. } => ErrorKind::Generation,
            Self::Config { .. } => ErrorKind::Config,
            Self::Serialization(_) | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the caller, not the system, is at fault (4xx-equivalent).
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidMode | ErrorKind::InvalidArgument
        )
    }

    /// Get the stable error code for tool responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::EmbeddingDimension { .. } => "EMBEDDING_DIMENSION_MISMATCH",
            Self::SearchBackend { .. } => "SEARCH_BACKEND_ERROR",
            Self::TextIndexMissing { .. } => "TEXT_INDEX_MISSING",
            Self::InvalidMode { .. } => "INVALID_MODE",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            Self::CollectionExists { .. } => "COLLECTION_EXISTS",
            Self::DocumentNotFound { .. } => "DOCUMENT_NOT_FOUND",
            Self::Generation { .. } => "GENERATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
