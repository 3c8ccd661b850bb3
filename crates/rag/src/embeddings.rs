//! Text Embeddings
//!
//! Generates dense embeddings for the vector index. The embedder's
//! [`model_id`](Embedder::model_id) is persisted with the index and must
//! match on reload.

use async_trait::async_trait;
use reqwest::Client;
use room_assistant_config::{EmbeddingProvider, EmbeddingSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
use crate::RagError;

/// Embedding backend
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a document chunk
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embed a search query
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        self.embed(query).await
    }

    /// Embed many texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Identifier recorded in the persisted index
    fn model_id(&self) -> &str;
}

/// Build the embedder named in settings
pub fn embedder_from_settings(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn Embedder>, RagError> {
    let embedder: Arc<dyn Embedder> = match settings.provider {
        EmbeddingProvider::OpenAi => {
            let mut config = OpenAIEmbeddingConfig::new(&settings.api_key, &settings.model);
            if let Some(ref endpoint) = settings.endpoint {
                config.endpoint = endpoint.clone();
            }
            config.batch_size = settings.batch_size.max(1);
            Arc::new(OpenAIEmbedder::new(config)?)
        }
        EmbeddingProvider::Ollama => {
            let mut config = OllamaEmbeddingConfig {
                model: settings.model.clone(),
                batch_size: settings.batch_size.max(1),
                ..Default::default()
            };
            if let Some(ref endpoint) = settings.endpoint {
                config.endpoint = endpoint.clone();
            }
            Arc::new(OllamaEmbedder::new(config)?)
        }
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(settings.dimensions)),
    };

    tracing::debug!(model = embedder.model_id(), "Embedder ready");
    Ok(embedder)
}

/// Deterministic bag-of-words embedder
///
/// Hashes lowercased words into a fixed number of buckets and L2-normalizes.
/// No network, stable across runs; useful offline and in tests. Texts that
/// share words score higher under cosine similarity.
pub struct HashEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("hash-{}", dimensions),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Generate the embedding synchronously
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        use unicode_segmentation::UnicodeSegmentation;

        let mut embedding = vec![0.0f32; self.dimensions];

        for word in text.unicode_words() {
            let idx = (fnv1a(&word.to_lowercase()) % self.dimensions as u64) as usize;
            embedding[idx] += 1.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embed_sync(text))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn fnv1a(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    s.bytes()
        .fold(OFFSET, |hash, b| (hash ^ b as u64).wrapping_mul(PRIME))
}

/// OpenAI embedding configuration
#[derive(Debug, Clone)]
pub struct OpenAIEmbeddingConfig {
    /// API endpoint
    pub endpoint: String,
    /// API key
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Texts per request
    pub batch_size: usize,
    /// Request timeout
    pub timeout: Duration,
}

impl OpenAIEmbeddingConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: model.into(),
            batch_size: 64,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI `/embeddings` client
pub struct OpenAIEmbedder {
    client: Client,
    config: OpenAIEmbeddingConfig,
}

impl OpenAIEmbedder {
    pub fn new(config: OpenAIEmbeddingConfig) -> Result<Self, RagError> {
        if config.api_key.is_empty() {
            return Err(RagError::Configuration(
                "API key required for OpenAI embeddings".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.endpoint.trim_end_matches('/'))
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let response = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(&self.config.api_key)
            .json(&EmbeddingRequest {
                model: &self.config.model,
                input,
            })
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "OpenAI embedding failed: {} - {}",
                status, text
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to parse OpenAI response: {}", e)))?;

        order_embeddings(body.data, input.len())
    }
}

/// Put response items back in request order
fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>, RagError> {
    if data.len() != expected {
        return Err(RagError::Embedding(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut embeddings = self.request(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            all.extend(self.request(batch).await?);
        }
        Ok(all)
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}
