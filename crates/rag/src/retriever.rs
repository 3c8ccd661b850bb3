//! Retrieval over the vector index

use async_trait::async_trait;
use std::sync::Arc;

use crate::embeddings::Embedder;
use crate::index::{ScoredNode, VectorStoreIndex};
use crate::RagError;

/// Retrieves passages relevant to a query
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Best `top_k` passages, best first
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>, RagError>;
}

/// Embeds the query and searches a [`VectorStoreIndex`]
pub struct VectorIndexRetriever {
    index: Arc<VectorStoreIndex>,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndexRetriever {
    pub fn new(index: Arc<VectorStoreIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &VectorStoreIndex {
        &self.index
    }
}

#[async_trait]
impl Retriever for VectorIndexRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>, RagError> {
        if self.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed_query(query).await?;
        if query_embedding.len() != self.index.dimensions() {
            return Err(RagError::Embedding(format!(
                "query embedding has {} dimensions, index has {}",
                query_embedding.len(),
                self.index.dimensions()
            )));
        }

        let hits = self.index.search(&query_embedding, top_k);
        tracing::debug!(
            query_len = query.len(),
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score).unwrap_or(0.0),
            "Retrieved passages"
        );
        Ok(hits)
    }
}
