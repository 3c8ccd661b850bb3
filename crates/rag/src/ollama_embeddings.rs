//! Embeddings from a local Ollama server (`POST /api/embed`)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::RagError;

#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    /// Server root, without `/api`
    pub endpoint: String,
    pub model: String,
    /// Inputs per request
    pub batch_size: usize,
    pub timeout: Duration,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            batch_size: 32,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct OllamaEmbedder {
    client: Client,
    url: String,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaEmbeddingConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        let url = format!("{}/api/embed", config.endpoint.trim_end_matches('/'));
        Ok(Self { client, url, config })
    }

    async fn embed_chunk(&self, input: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedBody {
                model: &self.config.model,
                input,
            })
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "{} answered {}: {}",
                self.config.model, status, detail
            )));
        }

        let EmbedReply { embeddings } = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("undecodable reply from {}: {}", self.url, e)))?;

        // Vectors come back positionally; a short reply would misalign nodes.
        if embeddings.len() != input.len() {
            return Err(RagError::Embedding(format!(
                "{} inputs produced {} vectors",
                input.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedReply {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_chunk(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("empty embedding reply".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            vectors.extend(self.embed_chunk(chunk).await?);
        }
        Ok(vectors)
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_built_once_without_double_slash() {
        let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig {
            endpoint: "http://gpu-box:11434/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(embedder.url, "http://gpu-box:11434/api/embed");
        assert_eq!(embedder.model_id(), "nomic-embed-text");
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        // Nothing listens on port 9; any request would fail.
        let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_body_shape() {
        let input = vec!["opening hours".to_string(), "parking".to_string()];
        let json = serde_json::to_value(EmbedBody {
            model: "nomic-embed-text",
            input: &input,
        })
        .unwrap();
        assert_eq!(json["model"], "nomic-embed-text");
        assert_eq!(json["input"][1], "parking");
    }
}
