//! Context Chat Engine
//!
//! For every user turn:
//! 1. retrieve the top-k passages for the message;
//! 2. render them into the context template;
//! 3. send one system message (`system_prompt + "\n" + context`), the
//!    memory window, then the user message;
//! 4. record the user turn and the reply in memory.
//!
//! The memory window is sized so that system message, history and the new
//! user message together stay within the memory ceiling.

use async_trait::async_trait;
use room_assistant_core::{ChatMemoryBuffer, ChatResponder, Message};
use room_assistant_llm::LlmBackend;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::index::ScoredNode;
use crate::retriever::Retriever;
use crate::RagError;

/// Placeholder replaced with the rendered passages
pub const CONTEXT_PLACEHOLDER: &str = "{context_str}";

pub const DEFAULT_CONTEXT_TEMPLATE: &str = "Context information is below.\n\
--------------------\n\
{context_str}\n\
--------------------\n";

/// Chat engine configuration
#[derive(Debug, Clone)]
pub struct ChatEngineConfig {
    /// Passages retrieved per turn
    pub similarity_top_k: usize,
    /// Persona instructions
    pub system_prompt: String,
    /// Must contain [`CONTEXT_PLACEHOLDER`]
    pub context_template: String,
}

impl ChatEngineConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            similarity_top_k: 5,
            system_prompt: system_prompt.into(),
            context_template: DEFAULT_CONTEXT_TEMPLATE.to_string(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.similarity_top_k = top_k;
        self
    }
}

/// Retrieval-augmented chat over a persisted index
pub struct ContextChatEngine {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LlmBackend>,
    memory: Arc<ChatMemoryBuffer>,
    config: ChatEngineConfig,
}

impl ContextChatEngine {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn LlmBackend>,
        memory: Arc<ChatMemoryBuffer>,
        config: ChatEngineConfig,
    ) -> Result<Self, RagError> {
        if config.similarity_top_k == 0 {
            return Err(RagError::Configuration(
                "similarity_top_k must be positive".to_string(),
            ));
        }
        if !config.context_template.contains(CONTEXT_PLACEHOLDER) {
            return Err(RagError::Configuration(format!(
                "context template must contain {}",
                CONTEXT_PLACEHOLDER
            )));
        }

        Ok(Self {
            retriever,
            llm,
            memory,
            config,
        })
    }

    pub fn config(&self) -> &ChatEngineConfig {
        &self.config
    }

    pub fn memory(&self) -> &ChatMemoryBuffer {
        &self.memory
    }

    /// Answer one user turn
    pub async fn chat(&self, message: &str) -> Result<String, RagError> {
        let messages = self.prepare(message).await?;
        let result = self.llm.generate(&messages).await?;
        self.record(message, &result.text);
        Ok(result.text)
    }

    /// Answer one user turn, streaming text deltas on `tx`
    pub async fn stream_chat(
        &self,
        message: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<String, RagError> {
        let messages = self.prepare(message).await?;
        let result = self.llm.generate_stream(&messages, tx).await?;
        self.record(message, &result.text);
        Ok(result.text)
    }

    async fn prepare(&self, message: &str) -> Result<Vec<Message>, RagError> {
        let nodes = self
            .retriever
            .retrieve(message, self.config.similarity_top_k)
            .await?;

        let system = Message::system(self.system_content(&nodes));
        let user = Message::user(message);
        let reserved = system.estimated_tokens() + user.estimated_tokens();
        let history = self.memory.get(reserved);

        tracing::debug!(
            passages = nodes.len(),
            history = history.len(),
            reserved_tokens = reserved,
            "Prepared chat request"
        );

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(system);
        messages.extend(history);
        messages.push(user);
        Ok(messages)
    }

    fn system_content(&self, nodes: &[ScoredNode]) -> String {
        let context = self
            .config
            .context_template
            .replace(CONTEXT_PLACEHOLDER, &render_passages(nodes));

        if self.config.system_prompt.is_empty() {
            context
        } else {
            format!("{}\n{}", self.config.system_prompt, context)
        }
    }

    fn record(&self, user: &str, reply: &str) {
        self.memory.put(Message::user(user));
        self.memory.put(Message::assistant(reply));
    }
}

/// Passages with their source file, separated by blank lines
fn render_passages(nodes: &[ScoredNode]) -> String {
    nodes
        .iter()
        .map(|hit| match hit.node.metadata.get("file_path") {
            Some(path) => format!("file_path: {}\n\n{}", path, hit.node.text),
            None => hit.node.text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl ChatResponder for ContextChatEngine {
    async fn respond(&self, user_text: &str) -> room_assistant_core::Result<String> {
        Ok(self.chat(user_text).await?)
    }

    async fn respond_stream(
        &self,
        user_text: &str,
        tx: mpsc::Sender<String>,
    ) -> room_assistant_core::Result<String> {
        Ok(self.stream_chat(user_text, tx).await?)
    }

    fn chat_memory(&self) -> Option<&ChatMemoryBuffer> {
        Some(&self.memory)
    }

    fn name(&self) -> &str {
        "context_chat_engine"
    }
}
