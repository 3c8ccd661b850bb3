//! Chat model access for the responders
//!
//! One OpenAI-compatible backend, with optional token streaming.
//!
//! Requests are made once; failures surface to the caller unchanged.

pub mod backend;

pub use backend::{
    Completion, FinishReason, LlmBackend, OpenAIBackend, OpenAIConfig,
};
pub use room_assistant_core::{Message, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for room_assistant_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Configuration(msg) => room_assistant_core::Error::Config(msg),
            other => room_assistant_core::Error::adapter("llm", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: room_assistant_core::Error = LlmError::Api("HTTP 500".into()).into();
        assert!(matches!(
            err,
            room_assistant_core::Error::RuntimeAdapter { ref component, .. } if component == "llm"
        ));

        let err: room_assistant_core::Error = LlmError::Configuration("no key".into()).into();
        assert!(matches!(err, room_assistant_core::Error::Config(_)));
    }
}
