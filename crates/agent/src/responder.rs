//! Plain responder: system prompt, bounded memory and the language model

use async_trait::async_trait;
use room_assistant_core::{ChatMemoryBuffer, ChatResponder, Message};
use room_assistant_llm::LlmBackend;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct LlmResponder {
    llm: Arc<dyn LlmBackend>,
    memory: Arc<ChatMemoryBuffer>,
    system: Message,
}

impl LlmResponder {
    pub fn new(
        llm: Arc<dyn LlmBackend>,
        memory: Arc<ChatMemoryBuffer>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            memory,
            system: Message::system(system_prompt),
        }
    }

    pub fn memory(&self) -> &ChatMemoryBuffer {
        &self.memory
    }

    fn prepare(&self, user_text: &str) -> Vec<Message> {
        let user = Message::user(user_text);
        let history = self
            .memory
            .get(self.system.estimated_tokens() + user.estimated_tokens());

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(self.system.clone());
        messages.extend(history);
        messages.push(user);
        messages
    }

    fn record(&self, user_text: &str, reply: &str) {
        self.memory.put(Message::user(user_text));
        self.memory.put(Message::assistant(reply));
    }
}

#[async_trait]
impl ChatResponder for LlmResponder {
    async fn respond(&self, user_text: &str) -> room_assistant_core::Result<String> {
        let result = self.llm.generate(&self.prepare(user_text)).await?;
        self.record(user_text, &result.text);
        Ok(result.text)
    }

    async fn respond_stream(
        &self,
        user_text: &str,
        tx: mpsc::Sender<String>,
    ) -> room_assistant_core::Result<String> {
        let result = self
            .llm
            .generate_stream(&self.prepare(user_text), tx)
            .await?;
        self.record(user_text, &result.text);
        Ok(result.text)
    }

    fn chat_memory(&self) -> Option<&ChatMemoryBuffer> {
        Some(&self.memory)
    }

    fn name(&self) -> &str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use room_assistant_core::Role;
    use room_assistant_llm::{Completion, FinishReason, LlmError};

    #[derive(Default)]
    struct ScriptedLlm {
        requests: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl LlmBackend for ScriptedLlm {
        async fn generate(&self, messages: &[Message]) -> Result<Completion, LlmError> {
            self.requests.lock().push(messages.to_vec());
            Ok(Completion {
                text: format!("reply {}", self.requests.lock().len()),
                tokens: 2,
                first_token_ms: 0,
                elapsed_ms: 0,
                finish_reason: FinishReason::Stop,
            })
        }

        async fn generate_stream(
            &self,
            messages: &[Message],
            tx: mpsc::Sender<String>,
        ) -> Result<Completion, LlmError> {
            let result = self.generate(messages).await?;
            let _ = tx.send(result.text.clone()).await;
            Ok(result)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_prompt_then_history_then_user() {
        let llm = Arc::new(ScriptedLlm::default());
        let responder = LlmResponder::new(
            llm.clone(),
            Arc::new(ChatMemoryBuffer::new(15000)),
            "You are a pharmacy assistant.",
        );

        assert_eq!(responder.respond("hi").await.unwrap(), "reply 1");
        assert_eq!(responder.respond("any offers?").await.unwrap(), "reply 2");

        let requests = llm.requests.lock();
        let second = &requests[1];
        assert_eq!(second[0], Message::system("You are a pharmacy assistant."));
        assert_eq!(second[1], Message::user("hi"));
        assert_eq!(second[2], Message::assistant("reply 1"));
        assert_eq!(second[3], Message::user("any offers?"));
        assert_eq!(second.iter().filter(|m| m.role == Role::System).count(), 1);
    }

    #[tokio::test]
    async fn test_stream_records_turns() {
        let llm = Arc::new(ScriptedLlm::default());
        let responder = LlmResponder::new(llm, Arc::new(ChatMemoryBuffer::default()), "p");

        let (tx, mut rx) = mpsc::channel(4);
        let reply = responder.respond_stream("hello", tx).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some(reply.as_str()));
        assert_eq!(responder.memory().len(), 2);
    }
}
