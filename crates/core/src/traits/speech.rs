//! Speech capabilities: voice activity, recognition, synthesis

use crate::transcript::TranscriptResult;
use crate::{AudioFrame, Result};
use async_trait::async_trait;

/// Recognizes one finished utterance at a time
///
/// ```ignore
/// let stt: Arc<dyn SpeechToText> = Arc::new(DeepgramStt::new(config)?);
/// let transcript = stt.transcribe(&utterance).await?;
/// ```
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    async fn transcribe(&self, audio: &AudioFrame) -> Result<TranscriptResult>;

    /// Provider model, for logs
    fn model_name(&self) -> &str;
}

/// Turns a piece of reply text into audio
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    async fn synthesize(&self, text: &str) -> Result<AudioFrame>;

    /// Provider voice or model, for logs
    fn model_name(&self) -> &str;
}

/// Detector thresholds
///
/// A frame counts as speech when its probability reaches `threshold`.
/// Speech must last `min_speech_duration_ms` before an utterance opens and
/// silence `min_silence_duration_ms` before it closes.
#[derive(Debug, Clone)]
pub struct VADConfig {
    pub threshold: f32,
    pub min_speech_duration_ms: u32,
    pub min_silence_duration_ms: u32,
    /// At or below this level a frame has probability 0
    pub energy_floor_db: f32,
    /// At or above this level a frame has probability 1
    pub energy_ceiling_db: f32,
}

impl Default for VADConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_speech_duration_ms: 256,
            min_silence_duration_ms: 320,
            energy_floor_db: -50.0,
            energy_ceiling_db: -20.0,
        }
    }
}

/// Result of feeding one frame to a detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VADEvent {
    /// Utterance confirmed
    SpeechStart,
    /// Inside an utterance (including a pause not yet long enough to end it)
    SpeechContinue { probability: f32 },
    /// Utterance closed by enough trailing silence
    SpeechEnd,
    Silence,
}

impl VADEvent {
    pub fn is_speech(&self) -> bool {
        matches!(self, Self::SpeechStart | Self::SpeechContinue { .. })
    }
}

/// Where a detector is between utterances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VADState {
    #[default]
    Idle,
    /// Speech heard, not yet long enough to confirm
    PendingSpeech,
    InSpeech,
    /// Silence heard inside an utterance, not yet long enough to end it
    PendingSilence,
}

/// Voice activity detector
///
/// Detectors are stateful: frames must arrive in capture order, and
/// [`reset`](VoiceActivityDetector::reset) drops any half-open utterance.
pub trait VoiceActivityDetector: Send + Sync + 'static {
    fn process_frame(&self, audio: &AudioFrame) -> Result<VADEvent>;

    /// Probability for a frame, leaving state untouched
    fn speech_probability(&self, audio: &AudioFrame) -> f32;

    fn reset(&self);

    fn current_state(&self) -> VADState;

    /// Detector kind, for logs
    fn model_info(&self) -> &str;
}
