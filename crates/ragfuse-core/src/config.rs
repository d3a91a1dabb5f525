//! Configuration types for ragfuse.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::types::{validate_weight, MAX_LIMIT, MIN_OVERFETCH_FACTOR};

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Text generation configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Default log filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: 30000,
        }
    }
}

/// Which embedding provider to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// ONNX sentence-transformer model on disk.
    Onnx,
    /// Deterministic token-hash embeddings (no model needed).
    #[default]
    Hash,
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider to use.
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Directory holding `model.onnx` and `tokenizer.json`.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Embedding dimension, fixed per deployment.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model_path: default_model_path(),
            dimension: 384,
            num_threads: 4,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Collection used when a request names none.
    #[serde(default = "default_collection")]
    pub default_collection: String,

    /// Default number of results.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Maximum number of results.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Share of the hybrid score given to vector similarity (0 = lexical only).
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// Candidates fetched per executor in hybrid mode, as a multiple of the limit.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,

    /// Minimum vector similarity applied to every vector search.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_collection: default_collection(),
            default_limit: 10,
            max_limit: MAX_LIMIT,
            vector_weight: 0.7,
            overfetch_factor: 2,
            min_score: None,
        }
    }
}

/// Text generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Model name.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Default sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Default maximum answer tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

// Default value functions

fn default_log_level() -> String {
    "info".to_string()
}

fn default_busy_timeout() -> u32 {
    30000
}

fn default_dimension() -> usize {
    384
}

fn default_num_threads() -> usize {
    4
}

fn default_collection() -> String {
    "documents".to_string()
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    MAX_LIMIT
}

fn default_vector_weight() -> f32 {
    0.7
}

fn default_overfetch_factor() -> usize {
    2
}

fn default_llm_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_llm_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ragfuse")
        .join("ragfuse.db")
}

fn default_model_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ragfuse")
        .join("models")
        .join("all-MiniLM-L6-v2")
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RagError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ragfuse").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("ragfuse.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        validate_weight(self.search.vector_weight)
            .map_err(|_| RagError::config("search.vector_weight must be within [0, 1]"))?;

        if self.search.max_limit == 0 || self.search.max_limit > MAX_LIMIT {
            return Err(RagError::config(format!(
                "search.max_limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        if self.search.default_limit == 0 || self.search.default_limit > self.search.max_limit {
            return Err(RagError::config(
                "search.default_limit must be between 1 and search.max_limit",
            ));
        }
        if self.search.overfetch_factor < MIN_OVERFETCH_FACTOR {
            return Err(RagError::config(format!(
                "search.overfetch_factor must be at least {}",
                MIN_OVERFETCH_FACTOR
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::config("embedding.dimension must be positive"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(RagError::config("llm.temperature must be within [0, 2]"));
        }
        Ok(())
    }
}
