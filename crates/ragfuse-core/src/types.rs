//! Core domain types for hybrid retrieval.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{RagError, Result};

/// Largest `limit` a single search may request.
pub const MAX_LIMIT: usize = 100;

/// Default share of the combined score given to vector similarity.
pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.7;

/// Hybrid search asks each executor for at least `limit` times this many
/// candidates.
pub const MIN_OVERFETCH_FACTOR: usize = 2;

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier within a collection.
    pub id: String,

    /// Optional title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Optional body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// User-provided metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Embedding vector, absent until the document has been embedded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    /// Create a document whose id is derived from its content.
    ///
    /// Re-ingesting identical text yields the same id, so an insert becomes
    /// an update instead of a duplicate.
    pub fn new(title: Option<&str>, content: &str) -> Self {
        Self::with_id(&content_id(content), title, content)
    }

    /// Create a document with an explicit id.
    pub fn with_id(id: &str, title: Option<&str>, content: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.map(String::from),
            content: Some(content.to_string()),
            metadata: HashMap::new(),
            tags: Vec::new(),
            embedding: None,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Attach tags.
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Text used for embedding: title and content joined by a blank line.
    pub fn embedding_text(&self) -> String {
        match (&self.title, &self.content) {
            (Some(t), Some(c)) => format!("{}\n\n{}", t, c),
            (Some(t), None) => t.clone(),
            (None, Some(c)) => c.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Stable id for a piece of content (blake3, hex).
pub fn content_id(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// A document paired with the raw score one executor gave it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub document: Document,

    /// Raw executor score (higher is better, scale depends on the source).
    pub score: f32,
}

impl Candidate {
    pub fn new(document: Document, score: f32) -> Self {
        Self { document, score }
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }
}

/// A document with its final, comparable score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    #[serde(flatten)]
    pub document: Document,

    /// Combined score; within [0, 1] for hybrid results.
    pub score: f32,
}

impl FusedResult {
    pub fn new(document: Document, score: f32) -> Self {
        Self { document, score }
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }
}

impl From<Candidate> for FusedResult {
    fn from(c: Candidate) -> Self {
        Self {
            document: c.document,
            score: c.score,
        }
    }
}

/// Result ordering used everywhere: score descending, then id ascending.
///
/// `total_cmp` keeps the order total even if a NaN slips through.
pub fn rank_order(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}

/// Sort candidates in rank order.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| rank_order(a.score, a.id(), b.score, b.id()));
}

/// Retrieval strategy for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Fulltext,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Fulltext => "fulltext",
            Self::Hybrid => "hybrid",
        }
    }
}

impl FromStr for SearchMode {
    type Err = RagError;

    /// Parse a mode name. Unknown names are an error, never a default.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" => Ok(Self::Vector),
            "fulltext" => Ok(Self::Fulltext),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(RagError::InvalidMode {
                mode: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Query text (must not be blank).
    pub text: String,

    /// Retrieval strategy.
    pub mode: SearchMode,

    /// Collection to search.
    pub collection: String,

    /// Maximum number of results, 1..=100.
    pub limit: usize,

    /// Overrides the engine's vector weight for hybrid mode.
    #[serde(default)]
    pub vector_weight: Option<f32>,

    /// Drop vector candidates scoring below this after retrieval.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl SearchQuery {
    pub fn new(text: &str, mode: SearchMode, collection: &str, limit: usize) -> Self {
        Self {
            text: text.to_string(),
            mode,
            collection: collection.to_string(),
            limit,
            vector_weight: None,
            min_score: None,
        }
    }

    pub fn with_vector_weight(mut self, weight: f32) -> Self {
        self.vector_weight = Some(weight);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Check the request contract before any backend is touched.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(RagError::invalid_argument("query text must not be empty"));
        }
        if self.collection.trim().is_empty() {
            return Err(RagError::invalid_argument("collection must not be empty"));
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(RagError::invalid_argument(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, self.limit
            )));
        }
        if let Some(w) = self.vector_weight {
            validate_weight(w)?;
        }
        Ok(())
    }
}

/// Reject weights outside [0, 1].
pub fn validate_weight(weight: f32) -> Result<()> {
    if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
        return Err(RagError::invalid_argument(format!(
            "vector weight must be within [0, 1], got {}",
            weight
        )));
    }
    Ok(())
}

/// Search results container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// The original query.
    pub query: String,

    /// Mode that produced these results.
    pub mode: SearchMode,

    /// Collection searched.
    pub collection: String,

    /// Total results returned.
    pub total: usize,

    /// Search latency in milliseconds.
    pub latency_ms: u64,

    /// Ranked results.
    pub results: Vec<FusedResult>,
}

/// A collection of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Collection name (unique identifier).
    pub name: String,

    /// Optional description.
    pub description: Option<String>,

    /// Whether lexical search is configured.
    pub text_index: bool,

    /// Creation timestamp (Unix millis).
    pub created_at: u64,
}

impl Collection {
    /// Create a new collection without a text index.
    pub fn new(name: &str, description: Option<&str>) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            name: name.to_string(),
            description: description.map(String::from),
            text_index: false,
            created_at: now,
        }
    }
}

/// Simple equality filter for non-ranked retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    /// Metadata keys that must equal the given values.
    #[serde(default)]
    pub equals: HashMap<String, serde_json::Value>,

    /// Tag the document must carry.
    #[serde(default)]
    pub tag: Option<String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, key: &str, value: serde_json::Value) -> Self {
        self.equals.insert(key.to_string(), value);
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    /// Whether a document passes this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        let tag_ok = self
            .tag
            .as_ref()
            .map(|t| doc.tags.iter().any(|dt| dt == t))
            .unwrap_or(true);

        tag_ok
            && self
                .equals
                .iter()
                .all(|(k, v)| doc.metadata.get(k) == Some(v))
    }
}

/// Statistics about the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    /// Number of collections.
    pub collections: u64,

    /// Number of documents.
    pub documents: u64,

    /// Number of documents that carry an embedding.
    pub embedded: u64,

    /// Number of collections with a text index.
    pub text_indexed: u64,

    /// Optional collection filter applied.
    pub filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_mode_parse() {
        assert_eq!("vector".parse::<SearchMode>().unwrap(), SearchMode::Vector);
        assert_eq!("FullText".parse::<SearchMode>().unwrap(), SearchMode::Fulltext);
        assert_eq!(" hybrid ".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
    }

    #[test]
    fn test_search_mode_unknown_is_error() {
        let err = "semantic".parse::<SearchMode>().unwrap_err();
        assert!(matches!(err, RagError::InvalidMode { ref mode } if mode == "semantic"));
        assert!("".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_search_mode_serde() {
        let json = serde_json::to_string(&SearchMode::Fulltext).unwrap();
        assert_eq!(json, "\"fulltext\"");
    }

    #[test]
    fn test_query_validation() {
        let ok = SearchQuery::new("rust", SearchMode::Hybrid, "documents", 10);
        assert!(ok.validate().is_ok());

        let blank = SearchQuery::new("   ", SearchMode::Vector, "documents", 10);
        assert!(blank.validate().is_err());

        let zero = SearchQuery::new("rust", SearchMode::Vector, "documents", 0);
        assert!(zero.validate().is_err());

        let too_many = SearchQuery::new("rust", SearchMode::Vector, "documents", 101);
        assert!(too_many.validate().is_err());

        let max = SearchQuery::new("rust", SearchMode::Vector, "documents", MAX_LIMIT);
        assert!(max.validate().is_ok());

        let bad_weight = ok.clone().with_vector_weight(1.5);
        assert!(bad_weight.validate().is_err());
    }

    #[test]
    fn test_rank_order_ties_by_id() {
        let mut candidates = vec![
            Candidate::new(Document::with_id("b", None, ""), 0.5),
            Candidate::new(Document::with_id("c", None, ""), 0.9),
            Candidate::new(Document::with_id("a", None, ""), 0.5),
        ];
        sort_candidates(&mut candidates);
        let ids: Vec<_> = candidates.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_content_id_is_stable() {
        let a = Document::new(Some("Title"), "same body");
        let b = Document::new(None, "same body");
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, Document::new(None, "other body").id);
    }

    #[test]
    fn test_embedding_text() {
        let doc = Document::with_id("1", Some("Rust"), "Systems language");
        assert_eq!(doc.embedding_text(), "Rust\n\nSystems language");
    }

    #[test]
    fn test_metadata_filter() {
        let doc = Document::with_id("1", None, "x")
            .with_metadata("lang", json!("es"))
            .with_tags(["ia", "ml"]);

        assert!(MetadataFilter::new().matches(&doc));
        assert!(MetadataFilter::new().where_eq("lang", json!("es")).matches(&doc));
        assert!(!MetadataFilter::new().where_eq("lang", json!("en")).matches(&doc));
        assert!(MetadataFilter::new().tag("ml").matches(&doc));
        assert!(!MetadataFilter::new().tag("db").matches(&doc));
    }

    #[test]
    fn test_fused_result_serializes_flat() {
        let result = FusedResult::new(Document::with_id("A", Some("T"), "body"), 0.5);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["id"], "A");
        assert_eq!(value["score"], 0.5);
        assert!(value.get("embedding").is_none());
    }
}
