//! Speech pipeline components
//!
//! Features:
//! - Energy-based voice activity detection with hysteresis
//! - Deepgram speech-to-text (pre-recorded REST API)
//! - Deepgram Aura text-to-speech
//! - Sentence chunking of streamed LLM output

pub mod sentence;
pub mod stt;
pub mod tts;
pub mod vad;

pub use sentence::{split_sentences, SentenceChunker};
pub use stt::{DeepgramStt, DeepgramSttConfig};
pub use tts::{DeepgramTts, DeepgramTtsConfig};
pub use vad::EnergyVad;

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("VAD error: {0}")]
    Vad(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<PipelineError> for room_assistant_core::Error {
    fn from(err: PipelineError) -> Self {
        use room_assistant_core::Error;

        match err {
            PipelineError::Configuration(msg) => Error::Config(msg),
            PipelineError::Vad(msg) => Error::adapter("vad", msg),
            PipelineError::Stt(msg) => Error::adapter("stt", msg),
            PipelineError::Tts(msg) => Error::adapter("tts", msg),
            PipelineError::Audio(msg) => Error::adapter("audio", msg),
            PipelineError::Timeout => Error::adapter("pipeline", "timeout"),
        }
    }
}
