//! Speech-to-text results

use serde::{Deserialize, Serialize};

/// Transcript of one utterance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// Recognized text
    pub text: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Whether this is a final transcript
    pub is_final: bool,
    /// Detected language, when the provider reports one
    #[serde(default)]
    pub language: Option<String>,
}

impl TranscriptResult {
    /// Final transcript with the given text and confidence
    pub fn final_text(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: true,
            language: None,
        }
    }

    /// Whether the transcript carries any words
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
