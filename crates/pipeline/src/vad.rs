//! Energy-based Voice Activity Detection
//!
//! Frame energy (dBFS) is mapped linearly onto a speech probability between
//! the configured floor and ceiling. A four-state machine adds hysteresis:
//! speech must persist for `min_speech_duration_ms` before `SpeechStart`,
//! and silence for `min_silence_duration_ms` before `SpeechEnd`.

use parking_lot::Mutex;
use room_assistant_config::VadSettings;
use room_assistant_core::{AudioFrame, Result, VADConfig, VADEvent, VADState, VoiceActivityDetector};
use std::time::Duration;

use crate::PipelineError;

/// Mutable detector state, guarded by one lock
#[derive(Debug, Default)]
struct DetectorState {
    state: VADState,
    /// Speech accumulated while pending
    speech: Duration,
    /// Silence accumulated while pending
    silence: Duration,
}

/// Energy VAD
pub struct EnergyVad {
    config: VADConfig,
    state: Mutex<DetectorState>,
}

impl EnergyVad {
    pub fn new(config: VADConfig) -> std::result::Result<Self, PipelineError> {
        if !(0.0..=1.0).contains(&config.threshold) {
            return Err(PipelineError::Configuration(format!(
                "VAD threshold must be within 0..=1, got {}",
                config.threshold
            )));
        }
        if config.energy_ceiling_db <= config.energy_floor_db {
            return Err(PipelineError::Configuration(format!(
                "VAD energy ceiling ({} dB) must exceed floor ({} dB)",
                config.energy_ceiling_db, config.energy_floor_db
            )));
        }

        Ok(Self {
            config,
            state: Mutex::new(DetectorState::default()),
        })
    }

    pub fn from_settings(settings: &VadSettings) -> std::result::Result<Self, PipelineError> {
        Self::new(VADConfig {
            threshold: settings.threshold,
            min_speech_duration_ms: settings.min_speech_ms,
            min_silence_duration_ms: settings.min_silence_ms,
            energy_floor_db: settings.energy_floor_db,
            energy_ceiling_db: settings.energy_ceiling_db,
        })
    }

    pub fn config(&self) -> &VADConfig {
        &self.config
    }

    fn probability(&self, frame: &AudioFrame) -> f32 {
        if frame.is_empty() || frame.energy_db <= self.config.energy_floor_db {
            return 0.0;
        }
        let span = self.config.energy_ceiling_db - self.config.energy_floor_db;
        ((frame.energy_db - self.config.energy_floor_db) / span).clamp(0.0, 1.0)
    }

    fn min_speech(&self) -> Duration {
        Duration::from_millis(self.config.min_speech_duration_ms as u64)
    }

    fn min_silence(&self) -> Duration {
        Duration::from_millis(self.config.min_silence_duration_ms as u64)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn process_frame(&self, audio: &AudioFrame) -> Result<VADEvent> {
        let probability = self.probability(audio);
        let is_speech = probability >= self.config.threshold;
        let mut s = self.state.lock();

        let event = match (s.state, is_speech) {
            (VADState::Idle, false) => VADEvent::Silence,

            (VADState::Idle, true) => {
                s.speech = audio.duration;
                if s.speech >= self.min_speech() {
                    s.state = VADState::InSpeech;
                    VADEvent::SpeechStart
                } else {
                    s.state = VADState::PendingSpeech;
                    VADEvent::Silence
                }
            }

            (VADState::PendingSpeech, true) => {
                s.speech += audio.duration;
                if s.speech >= self.min_speech() {
                    s.state = VADState::InSpeech;
                    VADEvent::SpeechStart
                } else {
                    VADEvent::Silence
                }
            }

            (VADState::PendingSpeech, false) => {
                s.state = VADState::Idle;
                s.speech = Duration::ZERO;
                VADEvent::Silence
            }

            (VADState::InSpeech, true) => VADEvent::SpeechContinue { probability },

            (VADState::InSpeech, false) => {
                s.state = VADState::PendingSilence;
                s.silence = audio.duration;
                if s.silence >= self.min_silence() {
                    *s = DetectorState::default();
                    VADEvent::SpeechEnd
                } else {
                    VADEvent::SpeechContinue { probability }
                }
            }

            (VADState::PendingSilence, true) => {
                s.state = VADState::InSpeech;
                s.silence = Duration::ZERO;
                VADEvent::SpeechContinue { probability }
            }

            (VADState::PendingSilence, false) => {
                s.silence += audio.duration;
                if s.silence >= self.min_silence() {
                    *s = DetectorState::default();
                    VADEvent::SpeechEnd
                } else {
                    VADEvent::SpeechContinue { probability }
                }
            }
        };

        Ok(event)
    }

    fn speech_probability(&self, audio: &AudioFrame) -> f32 {
        self.probability(audio)
    }

    fn reset(&self) {
        *self.state.lock() = DetectorState::default();
    }

    fn current_state(&self) -> VADState {
        self.state.lock().state
    }

    fn model_info(&self) -> &str {
        "energy"
    }
}
