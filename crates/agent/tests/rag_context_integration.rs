//! Integration tests for agent initialization with the document index

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use room_assistant_agent::{provision_index, AgentContext, AgentVariant};
use room_assistant_config::{EmbeddingProvider, Settings};
use room_assistant_core::{Message, Role};
use room_assistant_llm::{Completion, FinishReason, LlmBackend, LlmError};
use room_assistant_rag::ProvisionOutcome;

#[derive(Default)]
struct RecordingLlm {
    requests: Mutex<Vec<Vec<Message>>>,
}

#[async_trait]
impl LlmBackend for RecordingLlm {
    async fn generate(&self, messages: &[Message]) -> Result<Completion, LlmError> {
        self.requests.lock().push(messages.to_vec());
        Ok(Completion {
            text: "We open at nine in the morning.".to_string(),
            tokens: 8,
            first_token_ms: 1,
            elapsed_ms: 2,
            finish_reason: FinishReason::Stop,
        })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<Completion, LlmError> {
        let result = self.generate(messages).await?;
        for word in result.text.split_inclusive(' ') {
            let _ = tx.send(word.to_string()).await;
        }
        Ok(result)
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

const PROMPT: &str = "You are the pharmacy's helpful voice assistant.";

fn settings(root: &Path) -> Settings {
    std::fs::write(root.join("prompt.txt"), format!("\n  {PROMPT}\n\n")).unwrap();

    let data = root.join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("hours.txt"),
        "Store hours. The store opens at nine and closes at six on weekdays.",
    )
    .unwrap();
    std::fs::write(
        data.join("delivery.txt"),
        "Delivery. Orders above five hundred rupees ship free within two days.",
    )
    .unwrap();

    let mut settings = Settings::default();
    settings.agent.prompt_path = root.join("prompt.txt");
    settings.rag.source_dir = data;
    settings.rag.persist_dir = root.join("storage");
    settings.rag.embedding.provider = EmbeddingProvider::Hash;
    settings.rag.embedding.dimensions = 128;
    settings
}

#[tokio::test]
async fn test_existing_index_never_reads_source() {
    let dir = tempfile::tempdir().unwrap();

    let (built, outcome) = provision_index(&settings(dir.path()).rag).await.unwrap();
    assert_eq!(outcome, ProvisionOutcome::Built);
    assert!(dir.path().join("storage").is_dir());

    // source gone: a load must not need it
    let settings = settings(dir.path());
    std::fs::remove_dir_all(&settings.rag.source_dir).unwrap();

    let llm = Arc::new(RecordingLlm::default());
    let ctx = AgentContext::init_with_llm(settings, AgentVariant::Rag, llm)
        .await
        .unwrap();
    let (loaded, outcome) = ctx.index().unwrap();
    assert_eq!(outcome, ProvisionOutcome::Loaded);
    assert_eq!(loaded.index_id(), built.index_id());
    assert_eq!(loaded.len(), built.len());
}

#[tokio::test]
async fn test_chat_engine_sends_one_system_message() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(RecordingLlm::default());
    let ctx = AgentContext::init_with_llm(settings(dir.path()), AgentVariant::Rag, llm.clone())
        .await
        .unwrap();
    assert_eq!(ctx.system_prompt(), PROMPT);

    let responder = ctx.responder();
    responder.respond("when does the store open").await.unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    let reply = responder
        .respond_stream("is delivery free", tx)
        .await
        .unwrap();
    let mut streamed = String::new();
    while let Some(delta) = rx.recv().await {
        streamed.push_str(&delta);
    }
    assert_eq!(streamed, reply);

    let requests = llm.requests.lock();
    assert_eq!(requests.len(), 2);

    let second = &requests[1];
    let systems: Vec<_> = second.iter().filter(|m| m.role == Role::System).collect();
    assert_eq!(systems.len(), 1);
    assert_eq!(second[0].role, Role::System);
    assert!(second[0].content.starts_with(PROMPT));
    assert!(second[0].content.contains("ship free within two days"));
    assert!(second[0].content.contains("opens at nine"));

    // history from the first turn sits between the system and user messages
    assert_eq!(second[1], Message::user("when does the store open"));
    assert_eq!(second[2], Message::assistant("We open at nine in the morning."));
    assert_eq!(second.last(), Some(&Message::user("is delivery free")));
}

#[tokio::test]
async fn test_plain_context_keeps_history() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(RecordingLlm::default());
    let ctx = AgentContext::init_with_llm(settings(dir.path()), AgentVariant::Plain, llm.clone())
        .await
        .unwrap();

    let responder = ctx.responder();
    responder.respond("hello").await.unwrap();
    responder.respond("what are your hours").await.unwrap();

    let requests = llm.requests.lock();
    assert_eq!(requests[1][0], Message::system(PROMPT));
    assert_eq!(requests[1].len(), 4);
    assert!(!dir.path().join("storage").exists());
}
