//! Core traits and types for the room assistant
//!
//! This crate provides foundational types used across all other crates:
//! - Core traits for pluggable backends (VAD, STT, TTS, responders)
//! - Audio frame types and processing
//! - Chat message types and token-bounded chat memory
//! - The top-level error taxonomy

pub mod audio;
pub mod error;
pub mod llm_types;
pub mod memory;
pub mod tokens;
pub mod traits;
pub mod transcript;

pub use audio::{AudioFrame, Channels, SampleRate};
pub use error::{Error, Result};
pub use llm_types::{Message, Role};
pub use memory::ChatMemoryBuffer;
pub use tokens::estimate_tokens;
pub use transcript::TranscriptResult;

pub use traits::{
    ChatResponder, SpeechToText, TextToSpeech, VADConfig, VADEvent, VADState,
    VoiceActivityDetector,
};
