//! Conversational responder trait
//!
//! The assistant does not care whether a reply comes from a bare language
//! model with a system prompt or from a retrieval-augmented chat engine.
//! Both sit behind [`ChatResponder`].

use crate::{ChatMemoryBuffer, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait ChatResponder: Send + Sync + 'static {
    /// Produce the reply to one user turn
    ///
    /// Implementations own their conversation memory and record both the
    /// user turn and the reply.
    async fn respond(&self, user_text: &str) -> Result<String>;

    /// Stream the reply as text deltas
    ///
    /// The default forwards the full reply as a single chunk. Returns the
    /// complete reply once the stream is done.
    async fn respond_stream(&self, user_text: &str, tx: mpsc::Sender<String>) -> Result<String> {
        let reply = self.respond(user_text).await?;
        // Receiver gone means the listener stopped; the reply is still recorded.
        let _ = tx.send(reply.clone()).await;
        Ok(reply)
    }

    /// Conversation memory, when the responder keeps one
    ///
    /// The assistant writes spoken greetings here and cuts interrupted
    /// replies down to what the room heard.
    fn chat_memory(&self) -> Option<&ChatMemoryBuffer> {
        None
    }

    /// Name for logging
    fn name(&self) -> &str;
}
