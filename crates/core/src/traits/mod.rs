//! Core traits for the room assistant
//!
//! Every external capability sits behind a trait so that backends can be
//! swapped by configuration and replaced by mocks in tests.
//!
//! ```text
//! Speech Processing:
//!   - VoiceActivityDetector: Audio → speech boundaries
//!   - SpeechToText: Audio → Text transcription
//!   - TextToSpeech: Text → Audio synthesis
//!
//! Conversation:
//!   - ChatResponder: User turn → assistant reply
//! ```

mod responder;
mod speech;

pub use responder::ChatResponder;
pub use speech::{
    SpeechToText, TextToSpeech, VADConfig, VADEvent, VADState, VoiceActivityDetector,
};
