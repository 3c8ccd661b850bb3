//! Vector Store Index
//!
//! In-memory index of embedded chunks with cosine-similarity search,
//! persisted as three JSON files:
//!
//! ```text
//! <persist_dir>/
//!   index_store.json            format version, ids, embed model, dimensions
//!   docstore.json               node text and metadata
//!   default__vector_store.json  node embeddings
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::chunker::SentenceSplitter;
use crate::embeddings::Embedder;
use crate::reader::Document;
use crate::RagError;

/// Bumped whenever the on-disk layout changes
pub const INDEX_FORMAT_VERSION: u32 = 1;

const INDEX_STORE_FILE: &str = "index_store.json";
const DOCSTORE_FILE: &str = "docstore.json";
const VECTOR_STORE_FILE: &str = "default__vector_store.json";

/// An embedded chunk of a document
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub doc_id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub embedding: Vec<f32>,
}

/// Search hit
#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub node: Node,
    pub score: f32,
}

/// Vector index over document chunks
#[derive(Debug, Clone)]
pub struct VectorStoreIndex {
    index_id: String,
    created_at: DateTime<Utc>,
    embed_model: String,
    dimensions: usize,
    nodes: Vec<Node>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexStoreFile {
    format_version: u32,
    index_id: String,
    created_at: DateTime<Utc>,
    embed_model: String,
    dimensions: usize,
    node_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocstoreFile {
    nodes: HashMap<String, StoredNode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredNode {
    doc_id: String,
    text: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorStoreFile {
    embedding_dict: HashMap<String, Vec<f32>>,
}

impl VectorStoreIndex {
    /// Chunk, embed and index documents
    pub async fn from_documents(
        documents: &[Document],
        splitter: &SentenceSplitter,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self, RagError> {
        let mut pending: Vec<(String, String, String, BTreeMap<String, String>)> = Vec::new();

        for doc in documents {
            for chunk in splitter.split(&doc.text) {
                let mut metadata = doc.metadata.clone();
                metadata.insert("chunk_index".to_string(), chunk.index.to_string());
                pending.push((
                    uuid::Uuid::new_v4().to_string(),
                    doc.id.clone(),
                    chunk.text,
                    metadata,
                ));
            }
        }

        let mut embeddings = Vec::with_capacity(pending.len());
        for batch in pending.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|(_, _, text, _)| text.clone()).collect();
            embeddings.extend(embedder.embed_batch(&texts).await?);
        }

        if embeddings.len() != pending.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                pending.len(),
                embeddings.len()
            )));
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            return Err(RagError::Embedding(format!(
                "inconsistent embedding size: {} vs {}",
                bad.len(),
                dimensions
            )));
        }

        let nodes: Vec<Node> = pending
            .into_iter()
            .zip(embeddings)
            .map(|((id, doc_id, text, metadata), embedding)| Node {
                id,
                doc_id,
                text,
                metadata,
                embedding,
            })
            .collect();

        tracing::info!(
            documents = documents.len(),
            nodes = nodes.len(),
            dimensions,
            embed_model = embedder.model_id(),
            "Built vector index"
        );

        Ok(Self {
            index_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            embed_model: embedder.model_id().to_string(),
            dimensions,
            nodes,
        })
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-k nodes by cosine similarity, best first
    ///
    /// Ties keep insertion order so results are stable across reloads.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<ScoredNode> {
        let mut scored: Vec<(usize, f32)> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (i, cosine_similarity(query_embedding, &node.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| ScoredNode {
                node: self.nodes[i].clone(),
                score,
            })
            .collect()
    }

    /// Write the index to `dir`
    ///
    /// Files are staged in a sibling directory and renamed into place, so
    /// `dir` only appears once the index is complete.
    pub fn persist(&self, dir: &Path) -> Result<(), RagError> {
        if dir.exists() {
            return Err(RagError::file_access(dir, "persist directory already exists"));
        }

        let parent = dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| RagError::file_access(parent, e))?;

        let staging = staging_dir(dir);
        std::fs::create_dir_all(&staging).map_err(|e| RagError::file_access(&staging, e))?;

        let result = self.write_files(&staging).and_then(|_| {
            std::fs::rename(&staging, dir).map_err(|e| RagError::file_access(dir, e))
        });

        if result.is_err() {
            let _ = std::fs::remove_dir_all(&staging);
        }
        result?;

        tracing::info!(
            path = %dir.display(),
            nodes = self.nodes.len(),
            "Persisted vector index"
        );
        Ok(())
    }

    fn write_files(&self, dir: &Path) -> Result<(), RagError> {
        let index_store = IndexStoreFile {
            format_version: INDEX_FORMAT_VERSION,
            index_id: self.index_id.clone(),
            created_at: self.created_at,
            embed_model: self.embed_model.clone(),
            dimensions: self.dimensions,
            node_ids: self.nodes.iter().map(|n| n.id.clone()).collect(),
        };

        let docstore = DocstoreFile {
            nodes: self
                .nodes
                .iter()
                .map(|n| {
                    (
                        n.id.clone(),
                        StoredNode {
                            doc_id: n.doc_id.clone(),
                            text: n.text.clone(),
                            metadata: n.metadata.clone(),
                        },
                    )
                })
                .collect(),
        };

        let vector_store = VectorStoreFile {
            embedding_dict: self
                .nodes
                .iter()
                .map(|n| (n.id.clone(), n.embedding.clone()))
                .collect(),
        };

        write_json(&dir.join(INDEX_STORE_FILE), &index_store)?;
        write_json(&dir.join(DOCSTORE_FILE), &docstore)?;
        write_json(&dir.join(VECTOR_STORE_FILE), &vector_store)?;
        Ok(())
    }

    /// Load an index persisted by [`persist`](Self::persist)
    ///
    /// `expected_model` is the configured embedder's model id; a mismatch
    /// means query embeddings would live in a different space.
    pub fn load(dir: &Path, expected_model: &str) -> Result<Self, RagError> {
        let index_store: IndexStoreFile = read_json(&dir.join(INDEX_STORE_FILE))?;

        if index_store.format_version != INDEX_FORMAT_VERSION {
            return Err(RagError::CorruptState(format!(
                "unsupported index format version {} (expected {})",
                index_store.format_version, INDEX_FORMAT_VERSION
            )));
        }

        if index_store.embed_model != expected_model {
            return Err(RagError::CorruptState(format!(
                "index was built with embedding model '{}', configured model is '{}'",
                index_store.embed_model, expected_model
            )));
        }

        let mut docstore: DocstoreFile = read_json(&dir.join(DOCSTORE_FILE))?;
        let mut vector_store: VectorStoreFile = read_json(&dir.join(VECTOR_STORE_FILE))?;

        let mut nodes = Vec::with_capacity(index_store.node_ids.len());
        for id in &index_store.node_ids {
            let stored = docstore
                .nodes
                .remove(id)
                .ok_or_else(|| RagError::CorruptState(format!("node {} missing from docstore", id)))?;
            let embedding = vector_store.embedding_dict.remove(id).ok_or_else(|| {
                RagError::CorruptState(format!("node {} has no embedding", id))
            })?;

            if embedding.len() != index_store.dimensions {
                return Err(RagError::CorruptState(format!(
                    "node {} has {} dimensions, index declares {}",
                    id,
                    embedding.len(),
                    index_store.dimensions
                )));
            }

            nodes.push(Node {
                id: id.clone(),
                doc_id: stored.doc_id,
                text: stored.text,
                metadata: stored.metadata,
                embedding,
            });
        }

        tracing::info!(
            path = %dir.display(),
            index_id = %index_store.index_id,
            nodes = nodes.len(),
            "Loaded vector index"
        );

        Ok(Self {
            index_id: index_store.index_id,
            created_at: index_store.created_at,
            embed_model: index_store.embed_model,
            dimensions: index_store.dimensions,
            nodes,
        })
    }
}

fn staging_dir(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    dir.with_file_name(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4().simple()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RagError> {
    let json = serde_json::to_vec(value).map_err(|e| RagError::Index(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| RagError::file_access(path, e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, RagError> {
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::CorruptState(format!("{}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RagError::CorruptState(format!("{}: {}", path.display(), e)))
}

/// Cosine similarity; zero when either vector is zero or sizes differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::SplitterConfig;
    use crate::embeddings::HashEmbedder;

    fn doc(text: &str, name: &str) -> Document {
        let mut metadata = BTreeMap::new();
        metadata.insert("file_name".to_string(), name.to_string());
        Document {
            id: format!("doc-{}", name),
            text: text.to_string(),
            metadata,
        }
    }

    async fn build(embedder: &HashEmbedder) -> VectorStoreIndex {
        let docs = vec![
            doc("Orders above 500 rupees ship free. Delivery takes two days.", "delivery.txt"),
            doc("Lab tests can be booked online with home sample collection.", "labs.txt"),
            doc("Refunds are processed within seven working days.", "refunds.txt"),
        ];
        let splitter = SentenceSplitter::new(SplitterConfig::default()).unwrap();
        VectorStoreIndex::from_documents(&docs, &splitter, embedder, 2)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_build_and_search() {
        let embedder = HashEmbedder::new(256);
        let index = build(&embedder).await;
        assert_eq!(index.len(), 3);
        assert_eq!(index.dimensions(), 256);
        assert_eq!(index.embed_model(), "hash-256");

        let query = embedder.embed_sync("how long does delivery take");
        let hits = index.search(&query, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(
            hits[0].node.metadata.get("file_name").map(String::as_str),
            Some("delivery.txt")
        );
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_persist_then_load_round_trip() {
        let embedder = HashEmbedder::new(64);
        let index = build(&embedder).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage");

        index.persist(&path).unwrap();
        assert!(path.join(INDEX_STORE_FILE).exists());
        assert!(path.join(DOCSTORE_FILE).exists());
        assert!(path.join(VECTOR_STORE_FILE).exists());

        let loaded = VectorStoreIndex::load(&path, "hash-64").unwrap();
        assert_eq!(loaded.index_id(), index.index_id());
        assert_eq!(loaded.nodes(), index.nodes());

        let query = embedder.embed_sync("refunds processed");
        let before: Vec<String> = index.search(&query, 3).into_iter().map(|h| h.node.id).collect();
        let after: Vec<String> = loaded.search(&query, 3).into_iter().map(|h| h.node.id).collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_persist_leaves_no_staging_dirs() {
        let embedder = HashEmbedder::new(16);
        let index = build(&embedder).await;
        let dir = tempfile::tempdir().unwrap();
        index.persist(&dir.path().join("storage")).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_persist_refuses_existing_dir() {
        let embedder = HashEmbedder::new(16);
        let index = build(&embedder).await;
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            index.persist(dir.path()),
            Err(RagError::FileAccess { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_rejects_model_mismatch() {
        let embedder = HashEmbedder::new(16);
        let index = build(&embedder).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage");
        index.persist(&path).unwrap();

        let err = VectorStoreIndex::load(&path, "text-embedding-ada-002").unwrap_err();
        assert!(matches!(err, RagError::CorruptState(_)));
    }

    #[tokio::test]
    async fn test_load_rejects_corruption() {
        let embedder = HashEmbedder::new(16);
        let index = build(&embedder).await;
        let dir = tempfile::tempdir().unwrap();

        // bad json
        let path = dir.path().join("bad-json");
        index.persist(&path).unwrap();
        std::fs::write(path.join(DOCSTORE_FILE), b"{not json").unwrap();
        assert!(matches!(
            VectorStoreIndex::load(&path, "hash-16"),
            Err(RagError::CorruptState(_))
        ));

        // missing file
        let path = dir.path().join("missing");
        index.persist(&path).unwrap();
        std::fs::remove_file(path.join(VECTOR_STORE_FILE)).unwrap();
        assert!(matches!(
            VectorStoreIndex::load(&path, "hash-16"),
            Err(RagError::CorruptState(_))
        ));

        // wrong version
        let path = dir.path().join("version");
        index.persist(&path).unwrap();
        let raw = std::fs::read_to_string(path.join(INDEX_STORE_FILE)).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["format_version"] = serde_json::json!(99);
        std::fs::write(path.join(INDEX_STORE_FILE), value.to_string()).unwrap();
        assert!(matches!(
            VectorStoreIndex::load(&path, "hash-16"),
            Err(RagError::CorruptState(_))
        ));

        // wrong dimensions
        let path = dir.path().join("dims");
        index.persist(&path).unwrap();
        let raw = std::fs::read_to_string(path.join(INDEX_STORE_FILE)).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["dimensions"] = serde_json::json!(8);
        std::fs::write(path.join(INDEX_STORE_FILE), value.to_string()).unwrap();
        assert!(matches!(
            VectorStoreIndex::load(&path, "hash-16"),
            Err(RagError::CorruptState(_))
        ));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
