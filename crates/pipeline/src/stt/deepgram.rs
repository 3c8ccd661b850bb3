//! Deepgram STT Backend
//!
//! Sends one complete utterance as raw linear16 PCM to Deepgram's
//! pre-recorded `/listen` endpoint and returns the top alternative.

use async_trait::async_trait;
use reqwest::Client;
use room_assistant_config::SpeechSettings;
use room_assistant_core::{AudioFrame, SpeechToText, TranscriptResult};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::PipelineError;

/// Deepgram STT configuration
#[derive(Debug, Clone)]
pub struct DeepgramSttConfig {
    /// API base, e.g. https://api.deepgram.com/v1
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub language: String,
    pub timeout: Duration,
    /// Utterances shorter than this are not sent
    pub min_audio_ms: u64,
}

impl Default for DeepgramSttConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.deepgram.com/v1".to_string(),
            api_key: String::new(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            timeout: Duration::from_secs(30),
            min_audio_ms: 100,
        }
    }
}

impl From<&SpeechSettings> for DeepgramSttConfig {
    fn from(settings: &SpeechSettings) -> Self {
        Self {
            endpoint: settings.deepgram_endpoint.clone(),
            api_key: settings.deepgram_api_key.clone(),
            model: settings.stt_model.clone(),
            language: settings.stt_language.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
    #[serde(default)]
    detected_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

/// Deepgram STT
pub struct DeepgramStt {
    client: Client,
    config: DeepgramSttConfig,
}

impl DeepgramStt {
    pub fn new(config: DeepgramSttConfig) -> Result<Self, PipelineError> {
        if config.api_key.is_empty() {
            return Err(PipelineError::Configuration(
                "Deepgram API key is required for STT".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Stt(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn listen_url(&self, sample_rate: u32, channels: usize) -> String {
        format!(
            "{}/listen?model={}&language={}&encoding=linear16&sample_rate={}&channels={}&smart_format=true",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model,
            self.config.language,
            sample_rate,
            channels
        )
    }

    async fn request(&self, audio: &AudioFrame) -> Result<TranscriptResult, PipelineError> {
        let url = self.listen_url(audio.sample_rate.as_u32(), audio.channels.count());
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.config.api_key))
            .header("Content-Type", "audio/raw")
            .body(audio.to_pcm16())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Timeout
                } else {
                    PipelineError::Stt(format!("Deepgram request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Stt(format!(
                "Deepgram returned {}: {}",
                status, body
            )));
        }

        let body: ListenResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Stt(format!("Failed to parse STT response: {}", e)))?;

        let result = parse_transcript(body, &self.config.language);
        tracing::debug!(
            chars = result.text.len(),
            confidence = result.confidence,
            latency_ms = start.elapsed().as_millis() as u64,
            "Transcribed utterance"
        );
        Ok(result)
    }
}

fn parse_transcript(body: ListenResponse, default_language: &str) -> TranscriptResult {
    let Some(channel) = body.results.channels.into_iter().next() else {
        return TranscriptResult::final_text("", 0.0);
    };
    let language = channel
        .detected_language
        .unwrap_or_else(|| default_language.to_string());

    match channel.alternatives.into_iter().next() {
        Some(best) => TranscriptResult {
            text: best.transcript.trim().to_string(),
            confidence: best.confidence,
            is_final: true,
            language: Some(language),
        },
        None => TranscriptResult::final_text("", 0.0),
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn transcribe(&self, audio: &AudioFrame) -> room_assistant_core::Result<TranscriptResult> {
        if audio.duration < Duration::from_millis(self.config.min_audio_ms) {
            return Ok(TranscriptResult::final_text("", 0.0));
        }
        Ok(self.request(audio).await?)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use room_assistant_core::{Channels, SampleRate};

    fn stt() -> DeepgramStt {
        DeepgramStt::new(DeepgramSttConfig {
            api_key: "dg-test".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            DeepgramStt::new(DeepgramSttConfig::default()),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_listen_url() {
        assert_eq!(
            stt().listen_url(48000, 1),
            "https://api.deepgram.com/v1/listen?model=nova-2&language=en-US&encoding=linear16&sample_rate=48000&channels=1&smart_format=true"
        );
    }

    #[test]
    fn test_parse_transcript() {
        let body: ListenResponse = serde_json::from_value(serde_json::json!({
            "metadata": { "request_id": "abc" },
            "results": {
                "channels": [{
                    "alternatives": [
                        { "transcript": " Do you deliver to Pune? ", "confidence": 0.97 },
                        { "transcript": "do you deliver to prune", "confidence": 0.41 }
                    ]
                }]
            }
        }))
        .unwrap();

        let result = parse_transcript(body, "en-US");
        assert_eq!(result.text, "Do you deliver to Pune?");
        assert!((result.confidence - 0.97).abs() < 1e-6);
        assert!(result.is_final);
        assert_eq!(result.language.as_deref(), Some("en-US"));
    }

    #[test]
    fn test_parse_empty_results() {
        let body: ListenResponse =
            serde_json::from_value(serde_json::json!({ "results": { "channels": [] } })).unwrap();
        assert!(parse_transcript(body, "en-US").is_empty());
    }

    #[tokio::test]
    async fn test_short_audio_skips_request() {
        let frame = AudioFrame::new(vec![0.1; 160], SampleRate::Hz16000, Channels::Mono, 0);
        let result = stt().transcribe(&frame).await.unwrap();
        assert!(result.is_empty());
    }
}
