//! Voice assistant for a realtime room
//!
//! Features:
//! - `VoiceAssistant`: VAD, STT, a chat responder and TTS driven by room audio
//! - Plain responder (system prompt + bounded memory + LLM)
//! - `AgentContext`: one-shot initialization of prompt, index and chat engine
//! - Session driver: greet once, then wait for the room to disconnect

pub mod assistant;
pub mod context;
pub mod responder;
pub mod session;

pub use assistant::{
    AssistantComponents, AssistantConfig, AssistantEvent, SpeechOutcome, VoiceAssistant,
};
pub use context::{provision_index, AgentContext, AgentVariant};
pub use responder::LlmResponder;
pub use session::{run_session, SessionConfig, SessionEnd};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Core(#[from] room_assistant_core::Error),

    #[error("Assistant already started")]
    AlreadyStarted,

    #[error("Assistant not started")]
    NotStarted,

    #[error("Assistant task failed: {0}")]
    Task(String),
}

impl From<AgentError> for room_assistant_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Core(e) => e,
            other => room_assistant_core::Error::adapter("assistant", other),
        }
    }
}

macro_rules! impl_from_crate_error {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for AgentError {
                fn from(err: $err) -> Self {
                    AgentError::Core(err.into())
                }
            }
        )*
    };
}

impl_from_crate_error!(
    room_assistant_config::ConfigError,
    room_assistant_llm::LlmError,
    room_assistant_rag::RagError,
    room_assistant_pipeline::PipelineError,
    room_assistant_transport::TransportError,
);
