//! Deepgram Aura TTS
//!
//! `POST /speak` with `container=none` returns headerless linear16 PCM at
//! the requested sample rate.

use async_trait::async_trait;
use reqwest::Client;
use room_assistant_config::SpeechSettings;
use room_assistant_core::{AudioFrame, Channels, SampleRate, TextToSpeech};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::PipelineError;

#[derive(Debug, Clone)]
pub struct DeepgramTtsConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Voice model, e.g. aura-asteria-en
    pub model: String,
    pub sample_rate: SampleRate,
    pub timeout: Duration,
}

impl Default for DeepgramTtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.deepgram.com/v1".to_string(),
            api_key: String::new(),
            model: "aura-asteria-en".to_string(),
            sample_rate: SampleRate::Hz24000,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TryFrom<&SpeechSettings> for DeepgramTtsConfig {
    type Error = PipelineError;

    fn try_from(settings: &SpeechSettings) -> Result<Self, Self::Error> {
        let sample_rate = SampleRate::from_u32(settings.tts_sample_rate).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "unsupported TTS sample rate {}",
                settings.tts_sample_rate
            ))
        })?;

        Ok(Self {
            endpoint: settings.deepgram_endpoint.clone(),
            api_key: settings.deepgram_api_key.clone(),
            model: settings.tts_model.clone(),
            sample_rate,
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

pub struct DeepgramTts {
    client: Client,
    config: DeepgramTtsConfig,
}

impl DeepgramTts {
    pub fn new(config: DeepgramTtsConfig) -> Result<Self, PipelineError> {
        if config.api_key.is_empty() {
            return Err(PipelineError::Configuration(
                "Deepgram API key is required for TTS".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Tts(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn speak_url(&self) -> String {
        format!(
            "{}/speak?model={}&encoding=linear16&sample_rate={}&container=none",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model,
            self.config.sample_rate.as_u32()
        )
    }

    async fn request(&self, text: &str) -> Result<AudioFrame, PipelineError> {
        let start = Instant::now();

        let response = self
            .client
            .post(self.speak_url())
            .header("Authorization", format!("Token {}", self.config.api_key))
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Timeout
                } else {
                    PipelineError::Tts(format!("Deepgram request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Tts(format!(
                "Deepgram returned {}: {}",
                status, body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Tts(format!("Failed to read audio: {}", e)))?;

        if bytes.len() % 2 != 0 {
            tracing::warn!(len = bytes.len(), "Odd-length PCM16 payload, last byte dropped");
        }

        let frame = AudioFrame::from_pcm16(&bytes, self.config.sample_rate, Channels::Mono, 0);
        tracing::debug!(
            chars = text.len(),
            audio_ms = frame.duration.as_millis() as u64,
            latency_ms = start.elapsed().as_millis() as u64,
            "Synthesized speech"
        );
        Ok(frame)
    }
}

#[async_trait]
impl TextToSpeech for DeepgramTts {
    async fn synthesize(&self, text: &str) -> room_assistant_core::Result<AudioFrame> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(AudioFrame::new(Vec::new(), self.config.sample_rate, Channels::Mono, 0));
        }
        Ok(self.request(text).await?)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
