//! OpenAI-compatible embeddings client.

use super::{EmbeddingClient, http_client, post_json};
use crate::KgError;
use crate::config::EmbeddingSettings;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Embeddings over an OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings, api_key: impl Into<String>) -> Result<Self, KgError> {
        Ok(Self {
            http: http_client(settings.timeout_secs).map_err(KgError::Embedding)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KgError> {
        if text.trim().is_empty() {
            return Err(KgError::Embedding("cannot embed empty text".to_string()));
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "dimensions": self.dimensions,
        });
        let url = format!("{}/embeddings", self.base_url);
        let response: EmbeddingResponse = post_json(&self.http, &url, &self.api_key, &body)
            .await
            .map_err(KgError::Embedding)?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| KgError::Embedding("response contained no embedding".to_string()))?;
        debug!(model = %self.model, len = vector.len(), "embedded text");
        Ok(vector)
    }
}
