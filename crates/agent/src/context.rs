//! Agent context
//!
//! Everything a session needs, prepared once per process: the system
//! prompt, the chat responder for the chosen variant and, for the RAG
//! variant, the provisioned index. Each run builds a fresh context; nothing
//! here is global.

use room_assistant_config::{load_prompt, RagSettings, Settings};
use room_assistant_core::{ChatMemoryBuffer, ChatResponder};
use room_assistant_llm::{LlmBackend, OpenAIBackend, OpenAIConfig};
use room_assistant_pipeline::{DeepgramStt, DeepgramSttConfig, DeepgramTts, DeepgramTtsConfig, EnergyVad};
use room_assistant_rag::{
    embedder_from_settings, ChatEngineConfig, ContextChatEngine,
    IndexProvisioner, ProvisionOutcome, VectorIndexRetriever, VectorStoreIndex,
};
use std::sync::Arc;

use crate::assistant::{AssistantComponents, AssistantConfig, VoiceAssistant};
use crate::responder::LlmResponder;
use crate::session::SessionConfig;
use crate::AgentError;

/// Which responder the assistant answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentVariant {
    /// Prompt and chat memory only
    Plain,
    /// Context chat engine over the document index
    Rag,
}

impl AgentVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Rag => "rag",
        }
    }
}

impl std::fmt::Display for AgentVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct AgentContext {
    variant: AgentVariant,
    settings: Settings,
    system_prompt: String,
    responder: Arc<dyn ChatResponder>,
    index: Option<(Arc<VectorStoreIndex>, ProvisionOutcome)>,
}

impl AgentContext {
    /// Prepare a context with the configured OpenAI-compatible model
    pub async fn init(settings: Settings, variant: AgentVariant) -> Result<Self, AgentError> {
        let llm = OpenAIBackend::new(OpenAIConfig::from(&settings.llm))?;
        Self::init_with_llm(settings, variant, Arc::new(llm)).await
    }

    /// Prepare a context around an existing model backend
    ///
    /// Fails when the prompt file is unreadable or, for the RAG variant,
    /// when the index can be neither loaded nor built.
    pub async fn init_with_llm(
        settings: Settings,
        variant: AgentVariant,
        llm: Arc<dyn LlmBackend>,
    ) -> Result<Self, AgentError> {
        settings.validate()?;
        let system_prompt = load_prompt(&settings.agent.prompt_path)?;
        let model = llm.model_name().to_string();

        let (responder, index): (Arc<dyn ChatResponder>, _) = match variant {
            AgentVariant::Plain => {
                let memory = Arc::new(ChatMemoryBuffer::new(settings.agent.memory_token_limit));
                let responder = LlmResponder::new(llm, memory, system_prompt.clone());
                (Arc::new(responder), None)
            }
            AgentVariant::Rag => {
                let embedder = embedder_from_settings(&settings.rag.embedding)?;
                let (index, outcome) = IndexProvisioner::from_settings(&settings.rag)
                    .provision(embedder.as_ref())
                    .await?;
                let index = Arc::new(index);

                let retriever = Arc::new(VectorIndexRetriever::new(index.clone(), embedder));
                let memory = Arc::new(ChatMemoryBuffer::new(settings.rag.memory_token_limit));
                let config = ChatEngineConfig::new(system_prompt.clone())
                    .with_top_k(settings.rag.similarity_top_k);
                let engine = ContextChatEngine::new(retriever, llm, memory, config)?;
                (Arc::new(engine), Some((index, outcome)))
            }
        };

        tracing::info!(
            variant = %variant,
            responder = responder.name(),
            model = %model,
            prompt_chars = system_prompt.len(),
            "Agent context ready"
        );

        Ok(Self {
            variant,
            settings,
            system_prompt,
            responder,
            index,
        })
    }

    pub fn variant(&self) -> AgentVariant {
        self.variant
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn responder(&self) -> Arc<dyn ChatResponder> {
        self.responder.clone()
    }

    /// The index and whether it was built or loaded; `None` for the plain variant
    pub fn index(&self) -> Option<(&VectorStoreIndex, ProvisionOutcome)> {
        self.index
            .as_ref()
            .map(|(index, outcome)| (index.as_ref(), *outcome))
    }

    /// VAD and Deepgram speech services around this context's responder
    pub fn speech_components(&self) -> Result<AssistantComponents, AgentError> {
        let speech = &self.settings.speech;
        Ok(AssistantComponents {
            vad: Arc::new(EnergyVad::from_settings(&speech.vad)?),
            stt: Arc::new(DeepgramStt::new(DeepgramSttConfig::from(speech))?),
            responder: self.responder(),
            tts: Arc::new(DeepgramTts::new(DeepgramTtsConfig::try_from(speech)?)?),
        })
    }

    pub fn assistant(&self) -> Result<VoiceAssistant, AgentError> {
        Ok(VoiceAssistant::new(
            self.speech_components()?,
            AssistantConfig::from_settings(&self.settings.agent, self.settings.llm.stream),
        ))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from_settings(&self.settings.agent)
    }
}

/// Build or load the index without starting a session
pub async fn provision_index(
    settings: &RagSettings,
) -> Result<(VectorStoreIndex, ProvisionOutcome), AgentError> {
    let embedder = embedder_from_settings(&settings.embedding)?;
    let provisioned = IndexProvisioner::from_settings(settings)
        .provision(embedder.as_ref())
        .await?;
    Ok(provisioned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use room_assistant_config::EmbeddingProvider;
    use room_assistant_core::Message;
    use room_assistant_llm::{Completion, FinishReason, LlmError};
    use std::path::Path;
    use tokio::sync::mpsc;

    struct CannedLlm;

    #[async_trait]
    impl LlmBackend for CannedLlm {
        async fn generate(&self, _messages: &[Message]) -> Result<Completion, LlmError> {
            Ok(Completion {
                text: "ok".to_string(),
                tokens: 1,
                first_token_ms: 0,
                elapsed_ms: 0,
                finish_reason: FinishReason::Stop,
            })
        }

        async fn generate_stream(
            &self,
            messages: &[Message],
            _tx: mpsc::Sender<String>,
        ) -> Result<Completion, LlmError> {
            self.generate(messages).await
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn settings(root: &Path) -> Settings {
        let prompt = root.join("prompt.txt");
        std::fs::write(&prompt, "You are a pharmacy assistant.").unwrap();
        let data = root.join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("hours.txt"), "The store opens at nine.").unwrap();

        let mut settings = Settings::default();
        settings.agent.prompt_path = prompt;
        settings.rag.source_dir = data;
        settings.rag.persist_dir = root.join("storage");
        settings.rag.embedding.provider = EmbeddingProvider::Hash;
        settings.rag.embedding.dimensions = 64;
        settings
    }

    #[tokio::test]
    async fn test_plain_context() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AgentContext::init_with_llm(settings(dir.path()), AgentVariant::Plain, Arc::new(CannedLlm))
            .await
            .unwrap();

        assert_eq!(ctx.responder().name(), "llm");
        assert_eq!(ctx.system_prompt(), "You are a pharmacy assistant.");
        assert!(ctx.index().is_none());
        assert!(!dir.path().join("storage").exists());
    }

    #[tokio::test]
    async fn test_rag_context_builds_then_loads() {
        let dir = tempfile::tempdir().unwrap();

        let first = AgentContext::init_with_llm(settings(dir.path()), AgentVariant::Rag, Arc::new(CannedLlm))
            .await
            .unwrap();
        let (index, outcome) = first.index().unwrap();
        assert_eq!(outcome, ProvisionOutcome::Built);
        let id = index.index_id().to_string();
        assert_eq!(first.responder().name(), "context_chat_engine");

        let second = AgentContext::init_with_llm(settings(dir.path()), AgentVariant::Rag, Arc::new(CannedLlm))
            .await
            .unwrap();
        let (index, outcome) = second.index().unwrap();
        assert_eq!(outcome, ProvisionOutcome::Loaded);
        assert_eq!(index.index_id(), id);
    }

    #[tokio::test]
    async fn test_missing_prompt_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.agent.prompt_path = dir.path().join("absent.txt");

        let err = AgentContext::init_with_llm(settings, AgentVariant::Plain, Arc::new(CannedLlm))
            .await
            .err()
            .unwrap();
        let core: room_assistant_core::Error = err.into();
        assert!(matches!(core, room_assistant_core::Error::FileAccess { .. }));
    }

    #[tokio::test]
    async fn test_speech_components_need_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.speech.deepgram_api_key = String::new();
        let ctx = AgentContext::init_with_llm(settings, AgentVariant::Plain, Arc::new(CannedLlm))
            .await
            .unwrap();
        assert!(ctx.speech_components().is_err());
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(AgentVariant::Plain.to_string(), "plain");
        assert_eq!(AgentVariant::Rag.as_str(), "rag");
    }
}
