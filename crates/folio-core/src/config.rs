//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding span/embedding file pairs per document
    pub data_dir: PathBuf,

    /// Minimum span text length (chars) kept at ingestion / embedded
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,

    /// Top-K candidates selected by the lexical retriever
    #[serde(default = "default_topk_evidence")]
    pub topk_evidence: usize,

    /// Reading-order neighbor window (±N) for evidence expansion
    #[serde(default = "default_neighbor_window")]
    pub neighbor_window: usize,

    /// Chat model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Tavily API key for the web search tool (optional)
    #[serde(default)]
    pub tavily_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            min_chars: default_min_chars(),
            topk_evidence: default_topk_evidence(),
            neighbor_window: default_neighbor_window(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            tavily_api_key: std::env::var("TAVILY_API_KEY").ok(),
        }
    }
}

/// Chat model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "anthropic" or "openai"
    pub provider: String,

    /// Model identifier passed to the provider
    pub model: String,

    /// API key (falls back to the provider's standard env var when absent)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on generated tokens per model turn
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum model invocations per user query
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: std::env::var("FOLIO_LLM_PROVIDER")
                .unwrap_or_else(|_| "anthropic".to_string()),
            model: std::env::var("FOLIO_LLM_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-latest".to_string()),
            api_key: std::env::var("FOLIO_LLM_API_KEY").ok(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_iterations: default_max_iterations(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Embedding service configuration (OpenAI-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embeddings service
    pub url: String,

    /// Model name for embeddings
    pub model: String,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Embedding dimensions (auto-detected from the first response if unset)
    #[serde(default)]
    pub dimensions: Option<usize>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("FOLIO_EMBEDDING_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            model: std::env::var("FOLIO_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string()),
            api_key: std::env::var("FOLIO_EMBEDDING_API_KEY").ok(),
            dimensions: std::env::var("FOLIO_EMBEDDING_DIMS")
                .ok()
                .and_then(|s| s.parse().ok()),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FOLIO_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .map(|d| d.join("folio"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn default_min_chars() -> usize {
    std::env::var("FOLIO_MIN_CHARS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(20)
}

fn default_topk_evidence() -> usize {
    std::env::var("FOLIO_TOPK_EVIDENCE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8)
}

fn default_neighbor_window() -> usize {
    std::env::var("FOLIO_NEIGHBOR_WINDOW")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1)
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_max_iterations() -> usize {
    10
}

fn default_timeout() -> u64 {
    60
}
