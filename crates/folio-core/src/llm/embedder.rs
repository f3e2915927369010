//! Embedding generation behind an OpenAI-compatible HTTP service

use crate::config::EmbeddingConfig;
use crate::error::{FolioError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Embedder backed by an external HTTP service (vLLM, OpenAI, TEI, etc.)
pub struct HttpEmbedder {
    http_client: reqwest::Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    /// Create from configuration
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    /// Create with a model name overriding the configured one.
    ///
    /// Used when an index sidecar dictates which model must embed the
    /// query.
    pub fn for_model(mut config: EmbeddingConfig, model: impl Into<String>) -> Result<Self> {
        config.model = model.into();
        Self::new(config)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| FolioError::Llm("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.config.url.trim_end_matches('/'));
        let request = EmbedRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut req = self.http_client.post(&url).json(&request);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FolioError::External(format!(
                "Embedding service error (HTTP {status}): {body}"
            )));
        }

        let embed_response: EmbedResponse = response.json().await?;
        if embed_response.data.len() != texts.len() {
            return Err(FolioError::External(format!(
                "Embedding service returned {} vectors for {} inputs",
                embed_response.data.len(),
                texts.len()
            )));
        }
        Ok(embed_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        // 384 matches the default sentence-transformers MiniLM family
        self.config.dimensions.unwrap_or(384)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
