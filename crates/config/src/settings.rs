//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Prefix for settings environment variables
pub const ENV_PREFIX: &str = "ROOM_ASSISTANT";

/// Upper bound for the disconnect poll interval
pub const MAX_POLL_INTERVAL_MS: u64 = 1000;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - credentials may be absent until first use
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Session and persona configuration
    #[serde(default)]
    pub agent: AgentSettings,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmSettings,

    /// Index and retrieval configuration (rag variant)
    #[serde(default)]
    pub rag: RagSettings,

    /// Speech pipeline configuration
    #[serde(default)]
    pub speech: SpeechSettings,

    /// Room transport configuration
    #[serde(default)]
    pub transport: TransportSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

impl Settings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_agent()?;
        self.validate_rag()?;
        self.validate_llm()?;
        self.validate_credentials()?;
        Ok(())
    }

    fn validate_agent(&self) -> Result<(), ConfigError> {
        let agent = &self.agent;

        if agent.poll_interval_ms == 0 || agent.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::InvalidValue {
                field: "agent.poll_interval_ms".to_string(),
                message: format!(
                    "Must be between 1 and {}ms, got {}",
                    MAX_POLL_INTERVAL_MS, agent.poll_interval_ms
                ),
            });
        }

        if agent.memory_token_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.memory_token_limit".to_string(),
                message: "Memory token ceiling must be positive".to_string(),
            });
        }

        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        if rag.similarity_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.similarity_top_k".to_string(),
                message: "Must retrieve at least one passage".to_string(),
            });
        }

        if rag.memory_token_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.memory_token_limit".to_string(),
                message: "Memory token ceiling must be positive".to_string(),
            });
        }

        if rag.chunk_size == 0 || rag.chunk_overlap >= rag.chunk_size {
            return Err(ConfigError::InvalidValue {
                field: "rag.chunk_overlap".to_string(),
                message: format!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    rag.chunk_overlap, rag.chunk_size
                ),
            });
        }

        if rag.persist_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("rag.persist_dir".to_string()));
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            });
        }
        Ok(())
    }

    /// Credentials are only required up front in strict environments;
    /// elsewhere a missing key fails on first use.
    fn validate_credentials(&self) -> Result<(), ConfigError> {
        if !self.environment.is_strict() {
            return Ok(());
        }

        let required = [
            ("llm.api_key", &self.llm.api_key),
            ("speech.deepgram_api_key", &self.speech.deepgram_api_key),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ConfigError::MissingField(field.to_string()));
            }
        }

        if self.transport.kind == TransportKind::LiveKit {
            let required = [
                ("transport.url", &self.transport.url),
                ("transport.api_key", &self.transport.api_key),
                ("transport.api_secret", &self.transport.api_secret),
            ];
            for (field, value) in required {
                if value.is_empty() {
                    return Err(ConfigError::MissingField(field.to_string()));
                }
            }
        }

        Ok(())
    }
}

/// Session and persona configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// System prompt file
    #[serde(default = "default_prompt_path")]
    pub prompt_path: PathBuf,

    /// Greeting said once when the session starts
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Whether user speech may cut the greeting short
    #[serde(default = "default_true")]
    pub allow_interruptions: bool,

    /// Fallback interval for checking the room connection
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Chat memory ceiling for the plain variant
    #[serde(default = "default_memory_token_limit")]
    pub memory_token_limit: usize,
}

fn default_prompt_path() -> PathBuf {
    PathBuf::from("config/prompt.txt")
}
fn default_greeting() -> String {
    "Hello! I'm Health Assistant of Tata One MG. How can I help you today?".to_string()
}
fn default_true() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    MAX_POLL_INTERVAL_MS
}
fn default_memory_token_limit() -> usize {
    15000
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            prompt_path: default_prompt_path(),
            greeting: default_greeting(),
            allow_interruptions: true,
            poll_interval_ms: default_poll_interval_ms(),
            memory_token_limit: default_memory_token_limit(),
        }
    }
}

/// Language model configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_openai_api_key")]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Stream completions and speak sentence by sentence
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_api_key() -> String {
    std::env::var("OPENAI_API_KEY").unwrap_or_default()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> usize {
    512
}
fn default_llm_timeout_secs() -> u64 {
    30
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: default_openai_api_key(),
            model: default_llm_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            stream: true,
        }
    }
}

/// Index and retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSettings {
    /// Persisted index directory; its existence decides build vs load
    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,

    /// Document source directory
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Descend into subdirectories of the source directory
    #[serde(default)]
    pub recursive: bool,

    #[serde(default = "default_similarity_top_k")]
    pub similarity_top_k: usize,

    #[serde(default = "default_memory_token_limit")]
    pub memory_token_limit: usize,

    /// Chunk size in tokens
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunk overlap in tokens
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

fn default_persist_dir() -> PathBuf {
    PathBuf::from("./knowledge-storage")
}
fn default_source_dir() -> PathBuf {
    PathBuf::from("rag_data")
}
fn default_similarity_top_k() -> usize {
    5
}
fn default_chunk_size() -> usize {
    1024
}
fn default_chunk_overlap() -> usize {
    200
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            persist_dir: default_persist_dir(),
            source_dir: default_source_dir(),
            recursive: false,
            similarity_top_k: default_similarity_top_k(),
            memory_token_limit: default_memory_token_limit(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding: EmbeddingSettings::default(),
        }
    }
}

/// Embedding backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAi,
    Ollama,
    /// Deterministic offline embedder
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Base URL; provider default when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_openai_api_key")]
    pub api_key: String,

    /// Vector size for the hash embedder
    #[serde(default = "default_hash_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_hash_dimensions() -> usize {
    384
}
fn default_embed_batch_size() -> usize {
    64
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            endpoint: None,
            api_key: default_openai_api_key(),
            dimensions: default_hash_dimensions(),
            batch_size: default_embed_batch_size(),
        }
    }
}

/// Speech pipeline configuration (Deepgram STT/TTS, energy VAD)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    #[serde(default = "default_deepgram_endpoint")]
    pub deepgram_endpoint: String,

    #[serde(default = "default_deepgram_api_key")]
    pub deepgram_api_key: String,

    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    #[serde(default = "default_stt_language")]
    pub stt_language: String,

    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// Sample rate requested from TTS
    #[serde(default = "default_tts_sample_rate")]
    pub tts_sample_rate: u32,

    #[serde(default = "default_speech_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub vad: VadSettings,
}

fn default_deepgram_endpoint() -> String {
    "https://api.deepgram.com/v1".to_string()
}
fn default_deepgram_api_key() -> String {
    std::env::var("DEEPGRAM_API_KEY").unwrap_or_default()
}
fn default_stt_model() -> String {
    "nova-2".to_string()
}
fn default_stt_language() -> String {
    "en-US".to_string()
}
fn default_tts_model() -> String {
    "aura-asteria-en".to_string()
}
fn default_tts_sample_rate() -> u32 {
    24000
}
fn default_speech_timeout_secs() -> u64 {
    30
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            deepgram_endpoint: default_deepgram_endpoint(),
            deepgram_api_key: default_deepgram_api_key(),
            stt_model: default_stt_model(),
            stt_language: default_stt_language(),
            tts_model: default_tts_model(),
            tts_sample_rate: default_tts_sample_rate(),
            timeout_secs: default_speech_timeout_secs(),
            vad: VadSettings::default(),
        }
    }
}

/// Energy VAD thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSettings {
    #[serde(default = "default_vad_threshold")]
    pub threshold: f32,
    #[serde(default = "default_min_speech_ms")]
    pub min_speech_ms: u32,
    #[serde(default = "default_min_silence_ms")]
    pub min_silence_ms: u32,
    #[serde(default = "default_energy_floor_db")]
    pub energy_floor_db: f32,
    #[serde(default = "default_energy_ceiling_db")]
    pub energy_ceiling_db: f32,
}

fn default_vad_threshold() -> f32 {
    0.5
}
fn default_min_speech_ms() -> u32 {
    256
}
fn default_min_silence_ms() -> u32 {
    320
}
fn default_energy_floor_db() -> f32 {
    -50.0
}
fn default_energy_ceiling_db() -> f32 {
    -20.0
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: default_vad_threshold(),
            min_speech_ms: default_min_speech_ms(),
            min_silence_ms: default_min_silence_ms(),
            energy_floor_db: default_energy_floor_db(),
            energy_ceiling_db: default_energy_ceiling_db(),
        }
    }
}

/// Room transport kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    LiveKit,
    /// In-process room, for local runs and tests
    Loopback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default)]
    pub kind: TransportKind,

    #[serde(default = "default_livekit_url")]
    pub url: String,

    #[serde(default = "default_livekit_api_key")]
    pub api_key: String,

    #[serde(default = "default_livekit_api_secret")]
    pub api_secret: String,

    /// Participant identity of the assistant
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Room joined by `start`
    #[serde(default = "default_room")]
    pub room: String,

    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    /// Sample rate of audio exchanged with the room
    #[serde(default = "default_room_sample_rate")]
    pub sample_rate: u32,
}

fn default_livekit_url() -> String {
    std::env::var("LIVEKIT_URL").unwrap_or_default()
}
fn default_livekit_api_key() -> String {
    std::env::var("LIVEKIT_API_KEY").unwrap_or_default()
}
fn default_livekit_api_secret() -> String {
    std::env::var("LIVEKIT_API_SECRET").unwrap_or_default()
}
fn default_identity() -> String {
    "room-assistant".to_string()
}
fn default_room() -> String {
    "assistant".to_string()
}
fn default_token_ttl_secs() -> u64 {
    3600
}
fn default_room_sample_rate() -> u32 {
    48000
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            url: default_livekit_url(),
            api_key: default_livekit_api_key(),
            api_secret: default_livekit_api_secret(),
            identity: default_identity(),
            room: default_room(),
            token_ttl_secs: default_token_ttl_secs(),
            sample_rate: default_room_sample_rate(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`ROOM_ASSISTANT__` prefix, `__` nesting)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Same as [`load_settings`] with an explicit configuration directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::from(dir.join("default")).required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        environment = ?settings.environment,
        transport = ?settings.transport.kind,
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.rag.similarity_top_k, 5);
        assert_eq!(settings.rag.memory_token_limit, 15000);
        assert_eq!(settings.rag.persist_dir, PathBuf::from("./knowledge-storage"));
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert_eq!(settings.agent.poll_interval_ms, 1000);
        assert!(settings.agent.allow_interruptions);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let mut settings = Settings::default();
        settings.rag.similarity_top_k = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "rag.similarity_top_k"
        ));
    }

    #[test]
    fn test_rejects_zero_memory_ceiling() {
        let mut settings = Settings::default();
        settings.rag.memory_token_limit = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.agent.memory_token_limit = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_poll_interval_bounds() {
        let mut settings = Settings::default();
        settings.agent.poll_interval_ms = 1001;
        assert!(settings.validate().is_err());

        settings.agent.poll_interval_ms = 0;
        assert!(settings.validate().is_err());

        settings.agent.poll_interval_ms = 250;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_chunk_overlap_must_be_smaller() {
        let mut settings = Settings::default();
        settings.rag.chunk_overlap = settings.rag.chunk_size;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_strict_environment_requires_credentials() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.llm.api_key.clear();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField(field)) if field == "llm.api_key"
        ));
    }

    #[test]
    fn test_load_from_directory_layers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.yaml"),
            "agent:\n  greeting: \"Hi there\"\nrag:\n  similarity_top_k: 3\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("staging.yaml"),
            "rag:\n  similarity_top_k: 7\ntransport:\n  kind: loopback\n",
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), None).unwrap();
        assert_eq!(settings.agent.greeting, "Hi there");
        assert_eq!(settings.rag.similarity_top_k, 3);
        assert_eq!(settings.transport.kind, TransportKind::LiveKit);

        let settings = load_settings_from(dir.path(), Some("staging-missing")).unwrap();
        assert_eq!(settings.rag.similarity_top_k, 3);

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.agent.greeting, "Hi there");
        assert_eq!(settings.rag.similarity_top_k, 7);
        assert_eq!(settings.transport.kind, TransportKind::Loopback);
    }

    #[test]
    fn test_shipped_defaults_parse() {
        let yaml = include_str!("../../../config/default.yaml");
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.rag.chunk_size, 1024);
        assert_eq!(settings.rag.chunk_overlap, 200);
        assert_eq!(settings.agent.prompt_path, PathBuf::from("config/prompt.txt"));
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.yaml"), "rag:\n  similarity_top_k: 0\n").unwrap();
        assert!(load_settings_from(dir.path(), None).is_err());
    }
}
