//! Retrieval-augmented generation over a persisted vector index
//!
//! Features:
//! - Directory reader for plain-text documents
//! - Sentence-aware chunking with token overlap
//! - Remote (OpenAI, Ollama) and offline hash embedders
//! - In-memory vector index persisted as JSON, built once and reloaded
//! - Context chat engine: retrieved passages injected into the system message

pub mod chat_engine;
pub mod chunker;
pub mod embeddings;
pub mod index;
pub mod ollama_embeddings;
pub mod provisioner;
pub mod reader;
pub mod retriever;

pub use chat_engine::{ChatEngineConfig, ContextChatEngine, DEFAULT_CONTEXT_TEMPLATE};
pub use chunker::{SentenceSplitter, SplitterConfig, TextChunk};
pub use embeddings::{embedder_from_settings, Embedder, HashEmbedder, OpenAIEmbedder, OpenAIEmbeddingConfig};
pub use index::{Node, ScoredNode, VectorStoreIndex, INDEX_FORMAT_VERSION};
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use provisioner::{IndexProvisioner, ProvisionOutcome};
pub use reader::{DirectoryReader, Document};
pub use retriever::{Retriever, VectorIndexRetriever};

use std::path::PathBuf;
use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("File access error at {path}: {message}")]
    FileAccess { path: PathBuf, message: String },

    #[error("Corrupt index: {0}")]
    CorruptState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Llm(#[from] room_assistant_llm::LlmError),
}

impl RagError {
    pub(crate) fn file_access(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        RagError::FileAccess {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<RagError> for room_assistant_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::FileAccess { path, message } => {
                room_assistant_core::Error::FileAccess { path, message }
            }
            RagError::CorruptState(msg) => room_assistant_core::Error::CorruptState(msg),
            RagError::Configuration(msg) => room_assistant_core::Error::Config(msg),
            RagError::Llm(e) => e.into(),
            RagError::Embedding(msg) => room_assistant_core::Error::adapter("embedding", msg),
            RagError::Index(msg) => room_assistant_core::Error::adapter("index", msg),
        }
    }
}
