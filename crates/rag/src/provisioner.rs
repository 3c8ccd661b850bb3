//! Index provisioning
//!
//! The persist directory's existence is the only signal: absent means read
//! the source documents, build and persist; present means load. A loaded
//! index is never compared against the source documents.

use std::path::PathBuf;

use room_assistant_config::RagSettings;

use crate::chunker::{SentenceSplitter, SplitterConfig};
use crate::embeddings::Embedder;
use crate::index::VectorStoreIndex;
use crate::reader::DirectoryReader;
use crate::RagError;

/// How the active index came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Built,
    Loaded,
}

impl std::fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionOutcome::Built => write!(f, "built"),
            ProvisionOutcome::Loaded => write!(f, "loaded"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexProvisioner {
    persist_dir: PathBuf,
    source_dir: PathBuf,
    recursive: bool,
    splitter: SplitterConfig,
    batch_size: usize,
}

impl IndexProvisioner {
    pub fn new(persist_dir: impl Into<PathBuf>, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            persist_dir: persist_dir.into(),
            source_dir: source_dir.into(),
            recursive: false,
            splitter: SplitterConfig::default(),
            batch_size: 64,
        }
    }

    pub fn from_settings(settings: &RagSettings) -> Self {
        Self::new(&settings.persist_dir, &settings.source_dir)
            .recursive(settings.recursive)
            .splitter(SplitterConfig {
                chunk_size: settings.chunk_size,
                chunk_overlap: settings.chunk_overlap,
            })
            .batch_size(settings.embedding.batch_size)
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn splitter(mut self, config: SplitterConfig) -> Self {
        self.splitter = config;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn persist_dir(&self) -> &std::path::Path {
        &self.persist_dir
    }

    pub fn source_dir(&self) -> &std::path::Path {
        &self.source_dir
    }

    /// Load the persisted index, or build and persist one
    pub async fn provision(
        &self,
        embedder: &dyn Embedder,
    ) -> Result<(VectorStoreIndex, ProvisionOutcome), RagError> {
        if self.persist_dir.exists() {
            let index = VectorStoreIndex::load(&self.persist_dir, embedder.model_id())?;
            tracing::info!(
                path = %self.persist_dir.display(),
                nodes = index.len(),
                "Loaded persisted index"
            );
            return Ok((index, ProvisionOutcome::Loaded));
        }

        let index = self.build(embedder).await?;
        index.persist(&self.persist_dir)?;
        Ok((index, ProvisionOutcome::Built))
    }

    /// Read, chunk and embed the source directory without persisting
    pub async fn build(&self, embedder: &dyn Embedder) -> Result<VectorStoreIndex, RagError> {
        tracing::info!(
            source = %self.source_dir.display(),
            "No persisted index, building from source documents"
        );

        let documents = DirectoryReader::new(&self.source_dir)
            .recursive(self.recursive)
            .load_data()?;
        let splitter = SentenceSplitter::new(self.splitter)?;

        VectorStoreIndex::from_documents(&documents, &splitter, embedder, self.batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::retriever::{Retriever, VectorIndexRetriever};
    use std::sync::Arc;

    fn write_docs(dir: &std::path::Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join("delivery.txt"),
            "Orders are delivered within two days. Express delivery is available in metro cities.",
        )
        .unwrap();
        std::fs::write(
            dir.join("refunds.txt"),
            "Refunds are processed in five working days. Cancelled orders are refunded to the source account.",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_build_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("rag_data");
        let persist = tmp.path().join("storage");
        write_docs(&source);

        let embedder = HashEmbedder::new(128);
        let provisioner = IndexProvisioner::new(&persist, &source);

        let (built, outcome) = provisioner.provision(&embedder).await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::Built);
        assert!(persist.exists());

        let (loaded, outcome) = provisioner.provision(&embedder).await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::Loaded);
        assert_eq!(loaded.index_id(), built.index_id());

        let embedder = Arc::new(embedder);
        let query = "how long do refunds take";
        let a = VectorIndexRetriever::new(Arc::new(built), embedder.clone())
            .retrieve(query, 5)
            .await
            .unwrap();
        let b = VectorIndexRetriever::new(Arc::new(loaded), embedder)
            .retrieve(query, 5)
            .await
            .unwrap();
        let ids = |hits: &[crate::index::ScoredNode]| {
            hits.iter().map(|h| h.node.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&a), ids(&b));
    }

    #[tokio::test]
    async fn test_existing_index_ignores_source() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("rag_data");
        let persist = tmp.path().join("storage");
        write_docs(&source);

        let embedder = HashEmbedder::new(64);
        let provisioner = IndexProvisioner::new(&persist, &source);
        provisioner.provision(&embedder).await.unwrap();

        // source gone, then changed: neither is noticed
        std::fs::remove_dir_all(&source).unwrap();
        let (index, outcome) = provisioner.provision(&embedder).await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::Loaded);
        assert!(!index.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_is_file_access() {
        let tmp = tempfile::tempdir().unwrap();
        let provisioner =
            IndexProvisioner::new(tmp.path().join("storage"), tmp.path().join("missing"));

        let err = provisioner.provision(&HashEmbedder::new(32)).await.unwrap_err();
        assert!(matches!(err, RagError::FileAccess { .. }));
        assert!(!tmp.path().join("storage").exists());
    }

    #[tokio::test]
    async fn test_corrupt_index_is_not_rebuilt() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("rag_data");
        let persist = tmp.path().join("storage");
        write_docs(&source);
        std::fs::create_dir_all(&persist).unwrap();

        let err = IndexProvisioner::new(&persist, &source)
            .provision(&HashEmbedder::new(32))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::CorruptState(_)));
    }

    #[test]
    fn test_from_settings() {
        let settings = RagSettings::default();
        let provisioner = IndexProvisioner::from_settings(&settings);
        assert_eq!(provisioner.persist_dir(), std::path::Path::new("./knowledge-storage"));
        assert_eq!(provisioner.source_dir(), std::path::Path::new("rag_data"));
        assert_eq!(provisioner.splitter.chunk_size, 1024);
    }
}
